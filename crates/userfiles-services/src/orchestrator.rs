//! Upload orchestration
//!
//! One invocation walks `Init -> Validated -> Named -> DedupChecked -> Stored
//! -> Persisted -> Finalized`. The first failing stage aborts the run with its
//! error and the temporary upload file is removed on every exit path.
//!
//! Failure policy:
//! - validation and placement errors have no side effects
//! - a storage write that cannot be recorded is reported as
//!   `OrphanedStorageWrite` and the object is left in place for reconciliation
//! - a unique-index rejection at insert time is the authoritative duplicate
//!   signal; the pre-insert lookup only avoids the write
//! - derivative failures never change the outcome

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::sync::Arc;

use userfiles_core::constants::UPLOAD_PERMISSION;
use userfiles_core::models::{
    Actor, ContentUpdate, NewStoredFile, Placement, StoredFile, UploadCandidate,
};
use userfiles_core::{Config, ErrorMetadata, LogLevel, SourceConfig, UploadError};
use userfiles_db::{FileRepository, RepositoryError};
use userfiles_processing::{
    ContentInspector, DerivativeRenderer, ImageThumbnailer, InspectError, NameTemplater,
    NamingInput, PolicyValidator, ResizeParams, ValidationError,
};
use userfiles_storage::keys::container_prefixes;
use userfiles_storage::{join_key, Storage};
use uuid::Uuid;

use crate::cascade::{release_object, ThumbnailCascade};
use crate::duplicate::DuplicateChecker;
use crate::registry::SourceRegistry;
use crate::response::UploadResponse;
use crate::temp::TempFileGuard;

/// Uploaded payload as received by the request layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub temp_path: PathBuf,
    pub original_name: String,
}

impl UploadedFile {
    pub fn new(temp_path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            temp_path: temp_path.into(),
            original_name: original_name.into(),
        }
    }
}

/// Request parameters. Unset placement fields fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadedFile>,
    pub source: Option<i64>,
    pub parent: Option<i64>,
    pub class: Option<String>,
    pub list: Option<String>,
    pub context: Option<String>,
    /// Replace the content of this existing record
    pub crop: Option<Uuid>,
}

impl UploadRequest {
    pub fn new(file: UploadedFile) -> Self {
        Self {
            file: Some(file),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Init,
    Validated,
    Named,
    DedupChecked,
    Stored,
    Persisted,
    Finalized,
    Aborted(&'static str),
}

impl Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Init => write!(f, "init"),
            UploadState::Validated => write!(f, "validated"),
            UploadState::Named => write!(f, "named"),
            UploadState::DedupChecked => write!(f, "dedup_checked"),
            UploadState::Stored => write!(f, "stored"),
            UploadState::Persisted => write!(f, "persisted"),
            UploadState::Finalized => write!(f, "finalized"),
            UploadState::Aborted(reason) => write!(f, "aborted({})", reason),
        }
    }
}

/// Successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: StoredFile,
    /// Derivatives generated inline; empty when deferred
    pub derivatives: Vec<StoredFile>,
    pub deferred: bool,
}

struct Transitions {
    state: UploadState,
}

impl Transitions {
    fn new() -> Self {
        tracing::debug!(state = %UploadState::Init, "Upload state");
        Self {
            state: UploadState::Init,
        }
    }

    fn advance(&mut self, next: UploadState) {
        tracing::debug!(from = %self.state, state = %next, "Upload state");
        self.state = next;
    }
}

pub struct UploadOrchestrator {
    registry: Arc<SourceRegistry>,
    repository: Arc<dyn FileRepository>,
    inspector: ContentInspector,
    duplicates: DuplicateChecker,
    cascade: Arc<ThumbnailCascade>,
    default_source_id: i64,
    defer_thumbnails: bool,
}

impl UploadOrchestrator {
    pub fn new(
        config: &Config,
        registry: Arc<SourceRegistry>,
        repository: Arc<dyn FileRepository>,
    ) -> Self {
        Self {
            duplicates: DuplicateChecker::new(repository.clone(), &config.duplicate_search_fields),
            cascade: Arc::new(ThumbnailCascade::new(
                repository.clone(),
                Arc::new(ImageThumbnailer::new()),
            )),
            registry,
            repository,
            inspector: ContentInspector::new(),
            default_source_id: config.default_source_id,
            defer_thumbnails: config.defer_thumbnails,
        }
    }

    /// Swap the derivative renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn DerivativeRenderer>) -> Self {
        self.cascade = Arc::new(ThumbnailCascade::new(self.repository.clone(), renderer));
        self
    }

    /// Run the pipeline and wrap the result in the response envelope
    pub async fn handle(&self, actor: &Actor, request: UploadRequest) -> UploadResponse {
        match self.upload(actor, request).await {
            Ok(outcome) => UploadResponse::success(&outcome.record, &outcome.derivatives),
            Err(err) => UploadResponse::failure(&err),
        }
    }

    #[tracing::instrument(skip_all, fields(owner = %actor.owner().key(), crop = ?request.crop))]
    pub async fn upload(
        &self,
        actor: &Actor,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let Some(file) = request.file.clone() else {
            let err = UploadError::FileMissing("file".to_string());
            log_failure(&err);
            return Err(err);
        };

        let mut guard = TempFileGuard::new(&file.temp_path);
        let mut transitions = Transitions::new();

        let result = self
            .run(actor, &request, &file, &mut guard, &mut transitions)
            .await;

        release_temp(&mut guard).await;

        if let Err(err) = &result {
            transitions.advance(UploadState::Aborted(err.kind()));
            log_failure(err);
        }
        result
    }

    async fn run(
        &self,
        actor: &Actor,
        request: &UploadRequest,
        file: &UploadedFile,
        guard: &mut TempFileGuard,
        transitions: &mut Transitions,
    ) -> Result<UploadOutcome, UploadError> {
        if !actor.has_permission(UPLOAD_PERMISSION) {
            return Err(UploadError::PermissionDenied(UPLOAD_PERMISSION.to_string()));
        }

        let target = match request.crop {
            Some(id) => Some(self.load_target(id).await?),
            None => None,
        };
        let placement = self.placement(request, target.as_ref());
        let (source, storage) = self.registry.open(placement.source).await?;

        // Init -> Validated
        let candidate = self
            .inspector
            .inspect(&file.temp_path, &file.original_name)
            .await
            .map_err(|e| match e {
                InspectError::Unreadable { path, reason } => {
                    UploadError::FileUnreadable { path, reason }
                }
            })?;
        PolicyValidator::from_policy(&source.policy)
            .validate_all(&candidate)
            .map_err(|e| match e {
                ValidationError::FileTooLarge { size, max } => {
                    UploadError::FileTooLarge { size, max }
                }
                ValidationError::InvalidExtension { extension, allowed } => {
                    UploadError::FileTypeNotAllowed { extension, allowed }
                }
            })?;
        transitions.advance(UploadState::Validated);

        // Validated -> Named
        let templater = NameTemplater::new(source.naming);
        let path = templater
            .compose_path(&placement)
            .map_err(|e| UploadError::InvalidPlacement(e.to_string()))?;
        let input = NamingInput {
            hash: &candidate.hash,
            base_name: &candidate.name,
            ext: &candidate.ext,
            placement: &placement,
            session: &actor.session_id,
            created_by: actor.user_id,
            record_id: target.as_ref().map(|t| t.id),
            resize: ResizeParams::default(),
        };
        let filename = templater
            .expand(&source.file_name_template, &input)
            .map_err(|e| UploadError::InvalidPlacement(e.to_string()))?;
        let mut pending = pending_record(&candidate, &placement, actor, path, filename);
        transitions.advance(UploadState::Named);

        // Named -> DedupChecked
        let exclude = target.as_ref().map(|t| t.id);
        let duplicate = self
            .duplicates
            .is_duplicate(&pending, exclude)
            .await
            .map_err(|e| UploadError::Internal(e.to_string()))?;
        if duplicate {
            return Err(UploadError::DuplicateFile { file: pending.file });
        }
        pending.slot_key = Some(self.duplicates.slot_key(&pending));
        transitions.advance(UploadState::DedupChecked);

        // DedupChecked -> Stored
        for prefix in container_prefixes(&pending.path) {
            storage.create_container(&prefix).await.map_err(|e| {
                UploadError::ContainerCreateFailed {
                    path: prefix.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        let key = join_key(&pending.path, &pending.file);
        let stored = storage
            .store(&pending.path, &pending.file, &file.temp_path)
            .await
            .map_err(|e| UploadError::StorageWriteFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        release_temp(guard).await;
        pending.url = stored.url;
        transitions.advance(UploadState::Stored);

        // Stored -> Persisted
        let record = self
            .persist(pending, target.as_ref(), storage.as_ref(), &key)
            .await?;
        transitions.advance(UploadState::Persisted);

        if let Some(previous) = &target {
            if previous.storage_key() != record.storage_key() {
                release_object(
                    self.repository.as_ref(),
                    storage.as_ref(),
                    &previous.path,
                    &previous.file,
                )
                .await;
            }
        }

        // Persisted -> Finalized
        let outcome = self.finalize(record, source, storage).await;
        transitions.advance(UploadState::Finalized);

        tracing::info!(
            file_id = %outcome.record.id,
            storage_key = %outcome.record.storage_key(),
            size_bytes = outcome.record.size,
            derivatives = outcome.derivatives.len(),
            deferred = outcome.deferred,
            "Upload finished"
        );
        Ok(outcome)
    }

    async fn load_target(&self, id: Uuid) -> Result<StoredFile, UploadError> {
        let record = self
            .repository
            .get(id)
            .await
            .map_err(|e| UploadError::Internal(e.to_string()))?;
        match record {
            Some(record) if !record.is_derivative() => Ok(record),
            _ => Err(UploadError::RecordNotFound(id)),
        }
    }

    /// Placement of the upload. A crop keeps the placement of its record.
    fn placement(&self, request: &UploadRequest, target: Option<&StoredFile>) -> Placement {
        if let Some(target) = target {
            return Placement {
                source: target.source,
                parent: target.parent,
                class: target.class.clone(),
                list: target.list.clone(),
                context: target.context.clone(),
            };
        }

        let mut placement =
            Placement::with_defaults(request.source.unwrap_or(self.default_source_id));
        if let Some(parent) = request.parent {
            placement.parent = parent;
        }
        if let Some(class) = &request.class {
            placement.class = class.clone();
        }
        if let Some(list) = &request.list {
            placement.list = list.clone();
        }
        if let Some(context) = &request.context {
            placement.context = context.clone();
        }
        placement
    }

    async fn persist(
        &self,
        pending: NewStoredFile,
        target: Option<&StoredFile>,
        storage: &dyn Storage,
        key: &str,
    ) -> Result<StoredFile, UploadError> {
        let path = pending.path.clone();
        let file = pending.file.clone();

        let result = match target {
            Some(target) => {
                self.repository
                    .replace_content(target.id, content_update(pending))
                    .await
            }
            None => self.repository.create(pending).await,
        };

        match result {
            Ok(record) => Ok(record),
            Err(RepositoryError::UniqueViolation(constraint)) => {
                tracing::debug!(
                    constraint = %constraint,
                    storage_key = %key,
                    "Insert rejected by unique index"
                );
                release_object(self.repository.as_ref(), storage, &path, &file).await;
                Err(UploadError::DuplicateFile { file })
            }
            Err(e) => {
                tracing::error!(
                    event = "orphaned_storage_write",
                    storage_key = %key,
                    error = %e,
                    "File stored but its record could not be saved"
                );
                Err(UploadError::OrphanedStorageWrite {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn finalize(
        &self,
        record: StoredFile,
        source: SourceConfig,
        storage: Arc<dyn Storage>,
    ) -> UploadOutcome {
        if self.defer_thumbnails {
            let cascade = self.cascade.clone();
            let parent = record.clone();
            tokio::spawn(async move {
                cascade.run(&parent, &source, storage.as_ref()).await;
            });
            return UploadOutcome {
                record,
                derivatives: Vec::new(),
                deferred: true,
            };
        }

        let report = self.cascade.run(&record, &source, storage.as_ref()).await;
        UploadOutcome {
            record,
            derivatives: report.generated,
            deferred: false,
        }
    }
}

fn pending_record(
    candidate: &UploadCandidate,
    placement: &Placement,
    actor: &Actor,
    path: String,
    file: String,
) -> NewStoredFile {
    NewStoredFile {
        source: placement.source,
        parent: placement.parent,
        class: placement.class.clone(),
        list: placement.list.clone(),
        context: placement.context.clone(),
        derived_from: None,
        variant: None,
        name: candidate.name.clone(),
        ext: candidate.ext.clone(),
        mime: candidate.mime.clone(),
        size: candidate.size as i64,
        width: candidate.width as i32,
        height: candidate.height as i32,
        hash: candidate.hash.clone(),
        path,
        file,
        url: String::new(),
        properties: candidate.properties.clone(),
        session: actor.session_id.clone(),
        owner: actor.owner(),
        slot_key: None,
    }
}

fn content_update(pending: NewStoredFile) -> ContentUpdate {
    ContentUpdate {
        name: pending.name,
        ext: pending.ext,
        mime: pending.mime,
        size: pending.size,
        width: pending.width,
        height: pending.height,
        hash: pending.hash,
        path: pending.path,
        file: pending.file,
        url: pending.url,
        properties: pending.properties,
        slot_key: pending.slot_key,
    }
}

async fn release_temp(guard: &mut TempFileGuard) {
    if let Err(e) = guard.cleanup().await {
        tracing::warn!(error = %e, path = %guard.path().display(), "Failed to remove temp file");
    }
}

fn log_failure(err: &UploadError) {
    match err.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %err, kind = err.kind(), key = err.message_key(), "Upload rejected")
        }
        LogLevel::Warn => {
            tracing::warn!(error = %err, kind = err.kind(), key = err.message_key(), "Upload failed")
        }
        LogLevel::Error => {
            tracing::error!(error = %err, kind = err.kind(), key = err.message_key(), "Upload failed")
        }
    }
}
