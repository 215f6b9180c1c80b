//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Container creation failed: {0}")]
    ContainerFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Handle to a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// Storage abstraction trait
///
/// Backends are stateless capabilities selected per destination at
/// construction time. They own no records.
///
/// **Key format:** `{container}{filename}` where the container ends with `/`.
/// See the crate root documentation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Ensure every segment of a container path exists
    async fn create_container(&self, path: &str) -> StorageResult<()>;

    /// Store the contents of a local file under `path` + `filename`.
    ///
    /// The source file is left in place; the caller owns its cleanup.
    async fn store(&self, path: &str, filename: &str, source: &Path)
        -> StorageResult<StoredObject>;

    /// Store in-memory data (generated derivatives)
    async fn store_bytes(
        &self,
        path: &str,
        filename: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<StoredObject>;

    /// Download a file by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file by its storage key. Missing files are not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Retrievable URL for a key
    fn url(&self, storage_key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
