use std::path::Path as FsPath;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

use crate::keys::{join_key, validate_key};
use crate::traits::{Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;

/// One object of an [`UploadBatch`]
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub filename: String,
    pub data: Bytes,
}

/// Objects staged for a single container, transferred as a unit
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub container: String,
    pub entries: Vec<BatchEntry>,
}

impl UploadBatch {
    pub fn single(container: &str, filename: &str, data: Bytes) -> Self {
        Self {
            container: container.to_string(),
            entries: vec![BatchEntry {
                filename: filename.to_string(),
                data,
            }],
        }
    }
}

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

/// Public URL for an S3 object.
///
/// AWS uses `https://{bucket}.s3.{region}.amazonaws.com/{key}`; S3-compatible
/// providers get path-style `{endpoint}/{bucket}/{key}`.
pub fn object_url(endpoint: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    fn generate_url(&self, key: &str) -> String {
        object_url(self.endpoint_url.as_deref(), &self.bucket, &self.region, key)
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(size)
    }

    /// Upload every entry of a batch. On failure the entries already written
    /// are deleted again so the batch leaves nothing behind.
    pub async fn upload_batch(&self, batch: UploadBatch) -> StorageResult<Vec<StoredObject>> {
        let mut stored: Vec<StoredObject> = Vec::with_capacity(batch.entries.len());

        for entry in batch.entries {
            let key = join_key(&batch.container, &entry.filename);
            validate_key(&key)?;

            match self.put(&key, entry.data).await {
                Ok(size) => {
                    let url = self.generate_url(&key);
                    stored.push(StoredObject { key, url, size });
                }
                Err(e) => {
                    let rollbacks = stored.iter().map(|object| self.delete(&object.key));
                    for (object, result) in stored
                        .iter()
                        .zip(futures::future::join_all(rollbacks).await)
                    {
                        if let Err(rollback_err) = result {
                            tracing::warn!(
                                error = %rollback_err,
                                key = %object.key,
                                "Failed to roll back partial S3 batch"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(stored)
    }
}

#[async_trait]
impl Storage for S3Storage {
    /// Object stores have no directories; containers exist implicitly.
    async fn create_container(&self, path: &str) -> StorageResult<()> {
        let trimmed = path.trim_end_matches('/');
        if !trimmed.is_empty() {
            validate_key(trimmed).map_err(|e| StorageError::ContainerFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn store(
        &self,
        path: &str,
        filename: &str,
        source: &FsPath,
    ) -> StorageResult<StoredObject> {
        let data = tokio::fs::read(source).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read {}: {}", source.display(), e))
        })?;

        self.upload_batch(UploadBatch::single(path, filename, Bytes::from(data)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::UploadFailed("Empty upload batch".to_string()))
    }

    async fn store_bytes(
        &self,
        path: &str,
        filename: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<StoredObject> {
        let key = join_key(path, filename);
        validate_key(&key)?;
        let size = self.put(&key, data).await?;
        let url = self.generate_url(&key);
        Ok(StoredObject { key, url, size })
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let location = Path::from(storage_key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %storage_key,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Path::from(storage_key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = Path::from(storage_key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn url(&self, storage_key: &str) -> String {
        self.generate_url(storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
