//! Destination lookup
//!
//! Storage backends are created lazily per source on first use and cached.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use userfiles_core::{Config, SourceConfig, UploadError};
use userfiles_storage::{create_storage, Storage};

pub struct SourceRegistry {
    sources: HashMap<i64, SourceConfig>,
    storages: RwLock<HashMap<i64, Arc<dyn Storage>>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id, s)).collect(),
            storages: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sources.clone())
    }

    /// Use a pre-built backend for a source instead of the factory
    pub fn with_storage(mut self, source_id: i64, storage: Arc<dyn Storage>) -> Self {
        self.storages.get_mut().insert(source_id, storage);
        self
    }

    pub fn source(&self, id: i64) -> Option<&SourceConfig> {
        self.sources.get(&id)
    }

    /// Configuration and backend of a source
    pub async fn open(&self, id: i64) -> Result<(SourceConfig, Arc<dyn Storage>), UploadError> {
        let source = self
            .sources
            .get(&id)
            .cloned()
            .ok_or_else(|| UploadError::SourceInitFailed {
                source_id: id,
                reason: "unknown source".to_string(),
            })?;

        if let Some(storage) = self.storages.read().await.get(&id) {
            return Ok((source, storage.clone()));
        }

        let mut storages = self.storages.write().await;
        if let Some(storage) = storages.get(&id) {
            return Ok((source, storage.clone()));
        }

        let storage = create_storage(&source.backend).await.map_err(|e| {
            tracing::error!(error = %e, source_id = id, "Failed to initialize storage backend");
            UploadError::SourceInitFailed {
                source_id: id,
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            source_id = id,
            backend = %storage.backend_type(),
            "Storage backend initialized"
        );
        storages.insert(id, storage.clone());
        Ok((source, storage))
    }
}
