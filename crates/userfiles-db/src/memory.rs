//! In-process repository
//!
//! Enforces the same slot uniqueness as the `user_files` partial index, so
//! behaviour observed against it matches Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use userfiles_core::models::{ContentUpdate, DuplicateQuery, NewStoredFile, StoredFile};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::FileRepository;

const SLOT_CONSTRAINT: &str = "user_files_slot_key";

#[derive(Default)]
pub struct MemoryFileRepository {
    records: RwLock<HashMap<Uuid, StoredFile>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every live record
    pub async fn records(&self) -> Vec<StoredFile> {
        let records = self.records.read().await;
        let mut out: Vec<StoredFile> = records
            .values()
            .filter(|r| r.deleted_at.is_none())
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        out
    }

    pub async fn len(&self) -> usize {
        self.records().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn same_slot(a: &StoredFile, b: &StoredFile) -> bool {
    a.id != b.id
        && a.deleted_at.is_none()
        && b.deleted_at.is_none()
        && a.slot_key.is_some()
        && a.slot_key == b.slot_key
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn create(&self, file: NewStoredFile) -> RepositoryResult<StoredFile> {
        let record = file.into_record(Uuid::new_v4(), Utc::now());
        let mut records = self.records.write().await;

        if records.values().any(|existing| same_slot(existing, &record)) {
            return Err(RepositoryError::UniqueViolation(SLOT_CONSTRAINT.to_string()));
        }

        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredFile>> {
        let records = self.records.read().await;
        Ok(records.get(&id).filter(|r| r.deleted_at.is_none()).cloned())
    }

    async fn count_duplicates(&self, query: &DuplicateQuery) -> RepositoryResult<i64> {
        let owner_key = query.owner.key();
        let records = self.records.read().await;

        let count = records
            .values()
            .filter(|r| r.deleted_at.is_none() && r.derived_from.is_none())
            .filter(|r| r.owner_key == owner_key)
            .filter(|r| Some(r.id) != query.exclude_id)
            .filter(|r| {
                query
                    .criteria
                    .iter()
                    .all(|(field, value)| &r.field_value(*field) == value)
            })
            .count();

        Ok(count as i64)
    }

    async fn replace_content(
        &self,
        id: Uuid,
        update: ContentUpdate,
    ) -> RepositoryResult<StoredFile> {
        let mut records = self.records.write().await;

        let mut updated = records
            .get(&id)
            .filter(|r| r.deleted_at.is_none())
            .cloned()
            .ok_or(RepositoryError::NotFound(id))?;
        update.apply(&mut updated, Utc::now());

        if records.values().any(|existing| same_slot(existing, &updated)) {
            return Err(RepositoryError::UniqueViolation(SLOT_CONSTRAINT.to_string()));
        }

        records.insert(id, updated.clone());
        Ok(updated)
    }

    async fn count_by_key(&self, path: &str, file: &str) -> RepositoryResult<i64> {
        let records = self.records.read().await;
        let count = records
            .values()
            .filter(|r| r.deleted_at.is_none() && r.path == path && r.file == file)
            .count();
        Ok(count as i64)
    }

    async fn list_children(&self, parent_id: Uuid) -> RepositoryResult<Vec<StoredFile>> {
        let records = self.records.read().await;
        let mut children: Vec<StoredFile> = records
            .values()
            .filter(|r| r.deleted_at.is_none() && r.derived_from == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|r| r.created_at);
        Ok(children)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}
