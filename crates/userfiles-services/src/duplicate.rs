use std::sync::Arc;

use userfiles_core::models::{DuplicateField, DuplicateQuery, NewStoredFile};
use userfiles_db::{FileRepository, RepositoryResult};
use uuid::Uuid;

/// Looks for a live upload of the same content in the same slot by the same owner.
///
/// The comparison fields are configurable; ownership always applies and uses
/// exactly one mode (user id or session id, never both).
#[derive(Clone)]
pub struct DuplicateChecker {
    repository: Arc<dyn FileRepository>,
    fields: Vec<DuplicateField>,
}

impl DuplicateChecker {
    pub fn new(repository: Arc<dyn FileRepository>, fields: &[String]) -> Self {
        Self {
            repository,
            fields: DuplicateField::parse_list(fields),
        }
    }

    pub fn fields(&self) -> &[DuplicateField] {
        &self.fields
    }

    pub fn query_for(&self, pending: &NewStoredFile, exclude_id: Option<Uuid>) -> DuplicateQuery {
        DuplicateQuery {
            criteria: self
                .fields
                .iter()
                .map(|field| (*field, pending.field_value(*field)))
                .collect(),
            owner: pending.owner.clone(),
            exclude_id,
        }
    }

    /// Uniqueness key persisted with the record, so the database rejects
    /// exactly what this checker would report as a duplicate
    pub fn slot_key(&self, pending: &NewStoredFile) -> String {
        self.query_for(pending, None).slot_key()
    }

    pub async fn is_duplicate(
        &self,
        pending: &NewStoredFile,
        exclude_id: Option<Uuid>,
    ) -> RepositoryResult<bool> {
        let query = self.query_for(pending, exclude_id);
        let count = self.repository.count_duplicates(&query).await?;
        if count > 0 {
            tracing::debug!(
                hash = %pending.hash,
                owner = %pending.owner_key(),
                matches = count,
                "Duplicate upload detected"
            );
        }
        Ok(count > 0)
    }
}
