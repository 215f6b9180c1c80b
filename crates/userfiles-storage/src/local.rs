use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::keys::{join_key, validate_key};
use crate::traits::{Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/userfiles")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys with traversal sequences, and existing paths that resolve
    /// outside the base directory through symlinks.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        if let Ok(canonical) = path.canonicalize() {
            let base_canonical = self.base_path.canonicalize().map_err(|e| {
                StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
            })?;
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Generate public URL for file
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn create_container(&self, path: &str) -> StorageResult<()> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(());
        }
        let dir = self
            .key_to_path(trimmed)
            .map_err(|e| StorageError::ContainerFailed(e.to_string()))?;

        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::ContainerFailed(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        tracing::debug!(path = %dir.display(), container = %path, "Local container ready");
        Ok(())
    }

    async fn store(
        &self,
        path: &str,
        filename: &str,
        source: &Path,
    ) -> StorageResult<StoredObject> {
        let key = join_key(path, filename);
        let target = self.key_to_path(&key)?;

        self.ensure_parent_dir(&target).await?;

        let start = std::time::Instant::now();

        let size = fs::copy(source, &target).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                target.display(),
                e
            ))
        })?;

        let file = fs::File::open(&target).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to open file {}: {}", target.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", target.display(), e))
        })?;

        let url = self.generate_url(&key);

        tracing::info!(
            path = %target.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage store successful"
        );

        Ok(StoredObject { key, url, size })
    }

    async fn store_bytes(
        &self,
        path: &str,
        filename: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<StoredObject> {
        let key = join_key(path, filename);
        let target = self.key_to_path(&key)?;
        let size = data.len() as u64;

        self.ensure_parent_dir(&target).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&target).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", target.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", target.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", target.display(), e))
        })?;

        let url = self.generate_url(&key);

        tracing::info!(
            path = %target.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(StoredObject { key, url, size })
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }

        fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn url(&self, storage_key: &str) -> String {
        self.generate_url(storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("root"), "http://localhost/files/".into())
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_create_container_and_store() {
        let (dir, storage) = storage().await;
        storage.create_container("default/").await.unwrap();
        storage.create_container("default/modresource/0/").await.unwrap();
        assert!(dir.path().join("root/default/modresource/0").is_dir());

        let source = dir.path().join("upload.tmp");
        tokio::fs::write(&source, b"0123456789").await.unwrap();

        let stored = storage
            .store("default/modresource/0/", "abc.txt", &source)
            .await
            .unwrap();
        assert_eq!(stored.key, "default/modresource/0/abc.txt");
        assert_eq!(stored.url, "http://localhost/files/default/modresource/0/abc.txt");
        assert_eq!(stored.size, 10);
        assert!(source.exists());

        assert_eq!(storage.download(&stored.key).await.unwrap(), b"0123456789");
        assert!(storage.exists(&stored.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (dir, storage) = storage().await;
        let source = dir.path().join("upload.tmp");
        tokio::fs::write(&source, b"x").await.unwrap();

        assert!(matches!(
            storage.store("../", "evil.txt", &source).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.create_container("/etc/").await,
            Err(StorageError::ContainerFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (_dir, storage) = storage().await;
        storage.delete("default/missing.txt").await.unwrap();

        let stored = storage
            .store_bytes("a/", "b.bin", Bytes::from_static(b"hi"), "application/octet-stream")
            .await
            .unwrap();
        storage.delete(&stored.key).await.unwrap();
        assert!(!storage.exists(&stored.key).await.unwrap());
        assert!(matches!(
            storage.download(&stored.key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
