use std::sync::Arc;

use userfiles_core::BackendConfig;

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageError, StorageResult};

/// Create a storage backend from a destination's backend settings
pub async fn create_storage(backend: &BackendConfig) -> StorageResult<Arc<dyn Storage>> {
    match backend {
        #[cfg(feature = "storage-s3")]
        BackendConfig::S3 {
            bucket,
            region,
            endpoint,
        } => {
            if bucket.is_empty() {
                return Err(StorageError::ConfigError("S3_BUCKET not configured".to_string()));
            }
            if region.is_empty() {
                return Err(StorageError::ConfigError(
                    "S3_REGION or AWS_REGION not configured".to_string(),
                ));
            }
            let storage = S3Storage::new(bucket.clone(), region.clone(), endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        BackendConfig::S3 { .. } => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        BackendConfig::Local { path, base_url } => {
            if path.is_empty() {
                return Err(StorageError::ConfigError(
                    "LOCAL_STORAGE_PATH not configured".to_string(),
                ));
            }
            let storage = LocalStorage::new(path.clone(), base_url.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        BackendConfig::Local { .. } => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
