use async_trait::async_trait;
use userfiles_core::models::{ContentUpdate, DuplicateQuery, NewStoredFile, StoredFile};
use uuid::Uuid;

use crate::error::RepositoryResult;

/// Record store for uploaded files
///
/// Implementations must reject a second live top-level record with the same
/// (source, parent, class, list, hash, owner key) with `UniqueViolation`.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, file: NewStoredFile) -> RepositoryResult<StoredFile>;

    /// Live (not deleted) record by id
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredFile>>;

    /// Live top-level records matching every criterion within the owner scope
    async fn count_duplicates(&self, query: &DuplicateQuery) -> RepositoryResult<i64>;

    /// Swap the content fields of a record, keeping its identity
    async fn replace_content(&self, id: Uuid, update: ContentUpdate)
        -> RepositoryResult<StoredFile>;

    /// Live records (any owner, derivatives included) stored under `path` + `file`
    async fn count_by_key(&self, path: &str, file: &str) -> RepositoryResult<i64>;

    /// Derivatives generated from a record
    async fn list_children(&self, parent_id: Uuid) -> RepositoryResult<Vec<StoredFile>>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<()>;
}
