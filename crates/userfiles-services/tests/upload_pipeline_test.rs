//! End-to-end upload scenarios against local storage and the in-memory repository

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use userfiles_core::models::{
    Actor, ContentUpdate, DuplicateQuery, NewStoredFile, StoredFile,
};
use userfiles_core::{
    BackendConfig, Config, NamingStrategy, SourceConfig, ThumbnailSpec, UploadError, UploadPolicy,
};
use userfiles_db::{FileRepository, MemoryFileRepository, RepositoryError, RepositoryResult};
use userfiles_processing::{DerivativeRenderer, RenderedDerivative};
use userfiles_services::{
    LocalStorage, SourceRegistry, Storage, StorageBackend, StorageError, UploadOrchestrator,
    UploadRequest, UploadedFile,
};
use userfiles_storage::{StorageResult, StoredObject};
use uuid::Uuid;

/// Local storage that counts writes and can fail the next one
struct CountingStorage {
    inner: LocalStorage,
    stores: AtomicUsize,
    fail_next_store: AtomicBool,
}

#[async_trait]
impl Storage for CountingStorage {
    async fn create_container(&self, path: &str) -> StorageResult<()> {
        self.inner.create_container(path).await
    }

    async fn store(&self, path: &str, filename: &str, source: &Path) -> StorageResult<StoredObject> {
        if self.fail_next_store.swap(false, Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("bucket unavailable".to_string()));
        }
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(path, filename, source).await
    }

    async fn store_bytes(
        &self,
        path: &str,
        filename: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<StoredObject> {
        self.inner.store_bytes(path, filename, data, content_type).await
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.inner.download(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    fn url(&self, storage_key: &str) -> String {
        self.inner.url(storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

/// In-memory repository with switchable faults
#[derive(Default)]
struct FaultyRepository {
    inner: MemoryFileRepository,
    fail_create: bool,
    skip_duplicate_lookup: bool,
}

#[async_trait]
impl FileRepository for FaultyRepository {
    async fn create(&self, file: NewStoredFile) -> RepositoryResult<StoredFile> {
        if self.fail_create {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.create(file).await
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredFile>> {
        self.inner.get(id).await
    }

    async fn count_duplicates(&self, query: &DuplicateQuery) -> RepositoryResult<i64> {
        if self.skip_duplicate_lookup {
            return Ok(0);
        }
        self.inner.count_duplicates(query).await
    }

    async fn replace_content(&self, id: Uuid, update: ContentUpdate) -> RepositoryResult<StoredFile> {
        self.inner.replace_content(id, update).await
    }

    async fn count_by_key(&self, path: &str, file: &str) -> RepositoryResult<i64> {
        self.inner.count_by_key(path, file).await
    }

    async fn list_children(&self, parent_id: Uuid) -> RepositoryResult<Vec<StoredFile>> {
        self.inner.list_children(parent_id).await
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.inner.delete(id).await
    }
}

/// Renderer that always fails and counts its calls
#[derive(Default)]
struct BrokenRenderer {
    calls: AtomicUsize,
}

#[async_trait]
impl DerivativeRenderer for BrokenRenderer {
    async fn render(
        &self,
        _source: Bytes,
        _spec: &ThumbnailSpec,
        _source_ext: &str,
    ) -> Result<RenderedDerivative, anyhow::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("decoder crashed")
    }
}

struct Harness {
    dir: tempfile::TempDir,
    storage: Arc<CountingStorage>,
    orchestrator: UploadOrchestrator,
}

impl Harness {
    async fn new(repository: Arc<dyn FileRepository>, thumbnails: Vec<ThumbnailSpec>) -> Self {
        Self::configured(repository, |config| config.sources[0].thumbnails = thumbnails).await
    }

    async fn configured(
        repository: Arc<dyn FileRepository>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        tokio::fs::create_dir_all(&root).await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("incoming")).await.unwrap();

        let mut source = SourceConfig::new(
            1,
            BackendConfig::Local {
                path: root.to_string_lossy().into_owned(),
                base_url: "http://localhost/files".to_string(),
            },
        );
        source.policy = UploadPolicy::new(1024 * 1024, "jpg,png,txt");

        let mut config = Config {
            database_url: None,
            db_max_connections: 5,
            default_source_id: 1,
            sources: vec![source],
            duplicate_search_fields: vec!["parent,class,list,hash,source".to_string()],
            defer_thumbnails: false,
        };
        configure(&mut config);

        let storage = Arc::new(CountingStorage {
            inner: LocalStorage::new(&root, "http://localhost/files".to_string())
                .await
                .unwrap(),
            stores: AtomicUsize::new(0),
            fail_next_store: AtomicBool::new(false),
        });
        let registry = SourceRegistry::from_config(&config).with_storage(1, storage.clone());
        let orchestrator = UploadOrchestrator::new(&config, Arc::new(registry), repository);

        Self {
            dir,
            storage,
            orchestrator,
        }
    }

    /// A fresh temp upload holding `data`
    fn with_renderer(mut self, renderer: Arc<dyn DerivativeRenderer>) -> Self {
        self.orchestrator = self.orchestrator.with_renderer(renderer);
        self
    }

    async fn incoming(&self, data: &[u8]) -> PathBuf {
        let path = self
            .dir
            .path()
            .join("incoming")
            .join(format!("{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    async fn request(&self, data: &[u8], name: &str) -> (UploadRequest, PathBuf) {
        let temp = self.incoming(data).await;
        (UploadRequest::new(UploadedFile::new(&temp, name)), temp)
    }

    fn stores(&self) -> usize {
        self.storage.stores.load(Ordering::SeqCst)
    }
}

fn png(w: u32, h: u32, pixel: Rgba<u8>) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, pixel));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    out
}

/// Poll until the parent has `expected` derivatives
async fn wait_for_children(
    repository: &MemoryFileRepository,
    parent: Uuid,
    expected: usize,
) -> Vec<StoredFile> {
    for _ in 0..500 {
        let children = repository.list_children(parent).await.unwrap();
        if children.len() >= expected {
            return children;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("derivatives of {} never appeared", parent);
}

fn user() -> Actor {
    Actor::user(Uuid::new_v4(), "sess-user").uploader()
}

#[tokio::test]
async fn test_text_upload_is_stored_and_recorded() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), vec![ThumbnailSpec::new(120, 90)]).await;
    let (request, temp) = harness.request(b"0123456789", "Notes.TXT").await;

    let outcome = harness.orchestrator.upload(&user(), request).await.unwrap();

    let record = &outcome.record;
    assert_eq!(record.size, 10);
    assert_eq!(record.ext, "txt");
    assert_eq!(record.name, "Notes");
    assert_eq!(record.path, "default/modresource/0/");
    assert_eq!(record.file, format!("{}.txt", record.hash));
    assert_eq!(
        record.url,
        format!("http://localhost/files/default/modresource/0/{}", record.file)
    );
    assert!(outcome.derivatives.is_empty());
    assert!(!temp.exists());
    assert!(harness.storage.exists(&record.storage_key()).await.unwrap());
    assert_eq!(repository.len().await, 1);
}

#[tokio::test]
async fn test_same_owner_duplicate_is_rejected_before_writing() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), Vec::new()).await;
    let actor = user();

    let (first, _) = harness.request(b"0123456789", "a.txt").await;
    harness.orchestrator.upload(&actor, first).await.unwrap();

    let (second, temp) = harness.request(b"0123456789", "renamed.txt").await;
    let response = harness.orchestrator.handle(&actor, second).await;

    assert!(!response.success);
    assert_eq!(response.message, "userfiles_err_file_exists");
    assert!(response.placeholders.contains_key("file"));
    assert_eq!(harness.stores(), 1);
    assert_eq!(repository.len().await, 1);
    assert!(!temp.exists());
}

#[tokio::test]
async fn test_disallowed_extension_has_no_side_effects() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), Vec::new()).await;
    let (request, temp) = harness.request(b"MZ\x90\x00", "setup.exe").await;

    let err = harness.orchestrator.upload(&user(), request).await.unwrap_err();

    assert!(matches!(
        err,
        UploadError::FileTypeNotAllowed { ref extension, .. } if extension == "exe"
    ));
    assert!(!temp.exists());
    assert_eq!(harness.stores(), 0);
    assert!(repository.is_empty().await);
}

#[tokio::test]
async fn test_other_owners_do_not_count_as_duplicates() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), Vec::new()).await;

    for actor in [user(), Actor::anonymous("sess-b").uploader(), user()] {
        let (request, _) = harness.request(b"shared bytes", "shared.txt").await;
        harness.orchestrator.upload(&actor, request).await.unwrap();
    }
    assert_eq!(repository.len().await, 3);

    // anonymous uploads are scoped by session
    let (again, _) = harness.request(b"shared bytes", "shared.txt").await;
    let err = harness
        .orchestrator
        .upload(&Actor::anonymous("sess-b").uploader(), again)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::DuplicateFile { .. }));
}

#[tokio::test]
async fn test_crop_replaces_content_and_derivatives() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), vec![ThumbnailSpec::new(16, 16)]).await;
    let actor = user();

    let (request, _) = harness.request(&png(64, 32, Rgba([200, 0, 0, 255])), "photo.png").await;
    let original = harness.orchestrator.upload(&actor, request).await.unwrap();
    assert_eq!((original.record.width, original.record.height), (64, 32));
    assert_eq!(original.derivatives.len(), 1);
    let old_thumb = original.derivatives[0].clone();
    assert_eq!(old_thumb.variant.as_deref(), Some("16x16"));

    let (mut request, temp) = harness
        .request(&png(48, 48, Rgba([0, 0, 200, 255])), "photo.png")
        .await;
    request.crop = Some(original.record.id);
    let cropped = harness.orchestrator.upload(&actor, request).await.unwrap();

    assert_eq!(cropped.record.id, original.record.id);
    assert_ne!(cropped.record.hash, original.record.hash);
    assert_eq!((cropped.record.width, cropped.record.height), (48, 48));
    assert!(!temp.exists());

    let children = repository.list_children(original.record.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_ne!(children[0].id, old_thumb.id);
    assert_eq!(children[0].hash, cropped.derivatives[0].hash);

    assert!(!harness.storage.exists(&original.record.storage_key()).await.unwrap());
    assert!(!harness.storage.exists(&old_thumb.storage_key()).await.unwrap());
    assert!(harness.storage.exists(&cropped.record.storage_key()).await.unwrap());
    assert_eq!(repository.len().await, 2);
}

#[tokio::test]
async fn test_failed_store_then_retry_leaves_one_record() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::new(repository.clone(), Vec::new()).await;
    let actor = user();

    harness.storage.fail_next_store.store(true, Ordering::SeqCst);
    let (request, temp) = harness.request(b"retry me", "retry.txt").await;
    let err = harness.orchestrator.upload(&actor, request).await.unwrap_err();
    assert!(matches!(err, UploadError::StorageWriteFailed { .. }));
    assert!(!temp.exists());
    assert!(repository.is_empty().await);

    let (request, _) = harness.request(b"retry me", "retry.txt").await;
    harness.orchestrator.upload(&actor, request).await.unwrap();
    assert_eq!(repository.len().await, 1);
}

#[tokio::test]
async fn test_unrecorded_write_is_reported_as_orphaned() {
    let repository = Arc::new(FaultyRepository {
        fail_create: true,
        ..Default::default()
    });
    let harness = Harness::new(repository.clone(), Vec::new()).await;
    let (request, temp) = harness.request(b"lost record", "lost.txt").await;

    let err = harness.orchestrator.upload(&user(), request).await.unwrap_err();

    let key = match err {
        UploadError::OrphanedStorageWrite { key, .. } => key,
        other => panic!("expected an orphaned write, got {:?}", other),
    };
    assert!(key.starts_with("default/modresource/0/"));
    // the object stays for reconciliation
    assert!(harness.storage.exists(&key).await.unwrap());
    assert!(!temp.exists());
    assert!(repository.inner.is_empty().await);
}

#[tokio::test]
async fn test_unique_index_catches_racing_duplicate() {
    let repository = Arc::new(FaultyRepository {
        skip_duplicate_lookup: true,
        ..Default::default()
    });
    let harness = Harness::new(repository.clone(), Vec::new()).await;
    let actor = user();

    let (first, _) = harness.request(b"raced", "raced.txt").await;
    let stored = harness.orchestrator.upload(&actor, first).await.unwrap();

    let (second, _) = harness.request(b"raced", "raced.txt").await;
    let err = harness.orchestrator.upload(&actor, second).await.unwrap_err();

    assert!(matches!(err, UploadError::DuplicateFile { .. }));
    assert_eq!(repository.inner.len().await, 1);
    // the surviving record still owns the object
    assert!(harness.storage.exists(&stored.record.storage_key()).await.unwrap());
}

#[tokio::test]
async fn test_configured_name_field_keeps_same_bytes_apart() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::configured(repository.clone(), |config| {
        config.duplicate_search_fields = vec!["parent,class,list,hash,source,name".to_string()];
        config.sources[0].naming = NamingStrategy::Friendly;
    })
    .await;
    let actor = user();

    let (first, _) = harness.request(b"same bytes", "a.txt").await;
    let a = harness.orchestrator.upload(&actor, first).await.unwrap();
    let (second, _) = harness.request(b"same bytes", "b.txt").await;
    let b = harness.orchestrator.upload(&actor, second).await.unwrap();

    assert_eq!(a.record.hash, b.record.hash);
    assert_eq!(a.record.file, "a.txt");
    assert_eq!(b.record.file, "b.txt");
    assert_ne!(a.record.slot_key, b.record.slot_key);
    assert_eq!(repository.len().await, 2);
    assert!(harness.storage.exists(&a.record.storage_key()).await.unwrap());
    assert!(harness.storage.exists(&b.record.storage_key()).await.unwrap());

    // the same name again is still a duplicate
    let (again, _) = harness.request(b"same bytes", "a.txt").await;
    let err = harness.orchestrator.upload(&actor, again).await.unwrap_err();
    assert!(matches!(err, UploadError::DuplicateFile { .. }));
    assert_eq!(harness.stores(), 2);
}

#[tokio::test]
async fn test_configured_name_field_also_bounds_the_unique_index() {
    // pre-check disabled: only the stored slot key can tell the uploads apart
    let repository = Arc::new(FaultyRepository {
        skip_duplicate_lookup: true,
        ..Default::default()
    });
    let harness = Harness::configured(repository.clone(), |config| {
        config.duplicate_search_fields = vec!["parent,class,list,hash,source,name".to_string()];
        config.sources[0].naming = NamingStrategy::Friendly;
    })
    .await;
    let actor = user();

    let (first, _) = harness.request(b"same bytes", "a.txt").await;
    harness.orchestrator.upload(&actor, first).await.unwrap();
    let (second, _) = harness.request(b"same bytes", "b.txt").await;
    harness.orchestrator.upload(&actor, second).await.unwrap();
    assert_eq!(repository.inner.len().await, 2);

    let (again, _) = harness.request(b"same bytes", "a.txt").await;
    let err = harness.orchestrator.upload(&actor, again).await.unwrap_err();
    assert!(matches!(err, UploadError::DuplicateFile { .. }));
    assert_eq!(repository.inner.len().await, 2);
}

#[tokio::test]
async fn test_deferred_derivatives_appear_after_the_response() {
    let repository = Arc::new(MemoryFileRepository::new());
    let harness = Harness::configured(repository.clone(), |config| {
        config.defer_thumbnails = true;
        config.sources[0].thumbnails = vec![ThumbnailSpec::new(16, 16)];
    })
    .await;

    let (request, _) = harness.request(&png(64, 32, Rgba([0, 120, 0, 255])), "leaf.png").await;
    let outcome = harness.orchestrator.upload(&user(), request).await.unwrap();

    assert!(outcome.deferred);
    assert!(outcome.derivatives.is_empty());

    let children = wait_for_children(&repository, outcome.record.id, 1).await;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].variant.as_deref(), Some("16x16"));
    assert_eq!(children[0].slot_key, None);
    assert!(harness.storage.exists(&children[0].storage_key()).await.unwrap());
}

#[tokio::test]
async fn test_deferred_render_failure_keeps_the_upload() {
    let repository = Arc::new(MemoryFileRepository::new());
    let renderer = Arc::new(BrokenRenderer::default());
    let harness = Harness::configured(repository.clone(), |config| {
        config.defer_thumbnails = true;
        config.sources[0].thumbnails = vec![ThumbnailSpec::new(16, 16)];
    })
    .await
    .with_renderer(renderer.clone());

    let (request, _) = harness.request(&png(64, 32, Rgba([0, 0, 0, 255])), "dark.png").await;
    let response = harness.orchestrator.handle(&user(), request).await;

    assert!(response.success);
    assert_eq!(response.message, "userfiles_file_uploaded");
    assert_eq!(response.data["derivatives"], serde_json::json!([]));

    for _ in 0..500 {
        if renderer.calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let records = repository.records().await;
    assert_eq!(records.len(), 1);
    assert!(repository.list_children(records[0].id).await.unwrap().is_empty());
    assert!(harness.storage.exists(&records[0].storage_key()).await.unwrap());
}
