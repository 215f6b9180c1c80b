//! Derivative cascade
//!
//! Runs after a record is saved, in two observable phases: every existing
//! child of the record is removed, then the configured variants are rendered
//! and recorded. Nothing here can fail the parent upload.

use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use userfiles_core::models::{NewStoredFile, Owner, Placement, StoredFile};
use userfiles_core::{SourceConfig, ThumbnailSpec, UploadError};
use userfiles_db::FileRepository;
use userfiles_processing::{DerivativeRenderer, NameTemplater, NamingInput, ResizeParams};
use userfiles_storage::Storage;

/// What one cascade run did
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub removed: usize,
    pub generated: Vec<StoredFile>,
    pub failed: Vec<UploadError>,
}

pub struct ThumbnailCascade {
    repository: Arc<dyn FileRepository>,
    renderer: Arc<dyn DerivativeRenderer>,
}

impl ThumbnailCascade {
    pub fn new(repository: Arc<dyn FileRepository>, renderer: Arc<dyn DerivativeRenderer>) -> Self {
        Self {
            repository,
            renderer,
        }
    }

    pub async fn run(
        &self,
        parent: &StoredFile,
        source: &SourceConfig,
        storage: &dyn Storage,
    ) -> CascadeReport {
        let removed = self.purge(parent, storage).await;
        let mut report = self.generate(parent, source, storage).await;
        report.removed = removed;

        tracing::info!(
            file_id = %parent.id,
            removed = report.removed,
            generated = report.generated.len(),
            failed = report.failed.len(),
            "Derivative cascade finished"
        );
        report
    }

    /// Delete every child record of `parent` and its binary. Returns how many
    /// records were removed.
    pub async fn purge(&self, parent: &StoredFile, storage: &dyn Storage) -> usize {
        let children = match self.repository.list_children(parent.id).await {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!(error = %e, file_id = %parent.id, "Failed to list derivatives");
                return 0;
            }
        };

        let mut removed = 0;
        for child in children {
            if let Err(e) = self.repository.delete(child.id).await {
                tracing::warn!(error = %e, derivative_id = %child.id, "Failed to delete derivative record");
                continue;
            }
            removed += 1;
            release_object(self.repository.as_ref(), storage, &child.path, &child.file).await;
        }
        removed
    }

    /// Render and record each configured variant. Non-images are skipped.
    pub async fn generate(
        &self,
        parent: &StoredFile,
        source: &SourceConfig,
        storage: &dyn Storage,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        if source.thumbnails.is_empty() || parent.width <= 0 || parent.height <= 0 {
            return report;
        }

        let original = match storage.download(&parent.storage_key()).await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                for spec in &source.thumbnails {
                    report.failed.push(derivative_failure(parent, spec, e.to_string()));
                }
                return report;
            }
        };

        for spec in &source.thumbnails {
            match self.generate_one(parent, source, storage, original.clone(), spec).await {
                Ok(child) => report.generated.push(child),
                Err(reason) => report.failed.push(derivative_failure(parent, spec, reason)),
            }
        }
        report
    }

    async fn generate_one(
        &self,
        parent: &StoredFile,
        source: &SourceConfig,
        storage: &dyn Storage,
        original: Bytes,
        spec: &ThumbnailSpec,
    ) -> Result<StoredFile, String> {
        let rendered = self
            .renderer
            .render(original, spec, &parent.ext)
            .await
            .map_err(|e| e.to_string())?;

        let placement = Placement {
            source: parent.source,
            parent: parent.parent,
            class: parent.class.clone(),
            list: parent.list.clone(),
            context: parent.context.clone(),
        };
        let input = NamingInput {
            hash: &parent.hash,
            base_name: &parent.name,
            ext: &rendered.ext,
            placement: &placement,
            session: &parent.session,
            created_by: parent.created_by,
            record_id: Some(parent.id),
            resize: ResizeParams::from_spec(spec),
        };
        let filename = NameTemplater::new(source.naming)
            .expand(&source.thumbnail_name_template, &input)
            .map_err(|e| e.to_string())?;

        let hash = hex::encode(Sha256::digest(&rendered.data));
        let size = rendered.data.len() as i64;
        let stored = storage
            .store_bytes(&parent.path, &filename, rendered.data, &rendered.mime)
            .await
            .map_err(|e| e.to_string())?;

        let owner = match parent.created_by {
            Some(user) => Owner::User(user),
            None => Owner::Anonymous(parent.session.clone()),
        };
        let child = NewStoredFile {
            source: parent.source,
            parent: parent.parent,
            class: parent.class.clone(),
            list: parent.list.clone(),
            context: parent.context.clone(),
            derived_from: Some(parent.id),
            variant: Some(spec.variant()),
            name: parent.name.clone(),
            ext: rendered.ext.clone(),
            mime: rendered.mime,
            size,
            width: rendered.width as i32,
            height: rendered.height as i32,
            hash,
            path: parent.path.clone(),
            file: filename.clone(),
            url: stored.url,
            properties: serde_json::json!({
                "w": rendered.width,
                "h": rendered.height,
                "f": rendered.ext,
            }),
            session: parent.session.clone(),
            owner,
            slot_key: None,
        };

        match self.repository.create(child).await {
            Ok(record) => Ok(record),
            Err(e) => {
                release_object(self.repository.as_ref(), storage, &parent.path, &filename).await;
                Err(e.to_string())
            }
        }
    }
}

fn derivative_failure(parent: &StoredFile, spec: &ThumbnailSpec, reason: String) -> UploadError {
    let err = UploadError::DerivativeGenerationFailed {
        variant: spec.variant(),
        reason,
    };
    tracing::warn!(
        error = %err,
        kind = err.kind(),
        file_id = %parent.id,
        variant = %spec.variant(),
        "Derivative generation failed"
    );
    err
}

/// Delete a binary once no live record references its key
pub(crate) async fn release_object(
    repository: &dyn FileRepository,
    storage: &dyn Storage,
    path: &str,
    file: &str,
) {
    let key = format!("{}{}", path, file);
    match repository.count_by_key(path, file).await {
        Ok(0) => {
            if let Err(e) = storage.delete(&key).await {
                tracing::warn!(error = %e, storage_key = %key, "Failed to delete stored object");
            }
        }
        Ok(refs) => {
            tracing::debug!(storage_key = %key, references = refs, "Stored object still referenced");
        }
        Err(e) => {
            tracing::warn!(error = %e, storage_key = %key, "Failed to count object references");
        }
    }
}
