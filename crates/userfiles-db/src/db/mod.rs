//! Postgres repository for the `user_files` table

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::{PgPool, Postgres, QueryBuilder};
use userfiles_core::models::{
    ContentUpdate, DuplicateQuery, FieldValue, NewStoredFile, StoredFile,
};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::FileRepository;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const COLUMNS: &str = "id, source, parent, class, list, context, derived_from, variant, \
    name, ext, mime, size, width, height, hash, path, file, url, properties, session, \
    created_by, owner_key, slot_key, created_at, updated_at, deleted_at";

/// Repository for uploaded files
#[derive(Clone)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PostgresFileRepository {
    #[tracing::instrument(skip(self, file), fields(db.table = "user_files", db.operation = "insert"))]
    async fn create(&self, file: NewStoredFile) -> RepositoryResult<StoredFile> {
        let owner_key = file.owner_key();
        let created_by = file.created_by();

        let record = sqlx::query_as::<Postgres, StoredFile>(&format!(
            r#"
            INSERT INTO user_files (
                source, parent, class, list, context, derived_from, variant,
                name, ext, mime, size, width, height, hash, path, file, url,
                properties, session, created_by, owner_key, slot_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(file.source)
        .bind(file.parent)
        .bind(&file.class)
        .bind(&file.list)
        .bind(&file.context)
        .bind(file.derived_from)
        .bind(&file.variant)
        .bind(&file.name)
        .bind(&file.ext)
        .bind(&file.mime)
        .bind(file.size)
        .bind(file.width)
        .bind(file.height)
        .bind(&file.hash)
        .bind(&file.path)
        .bind(&file.file)
        .bind(&file.url)
        .bind(&file.properties)
        .bind(&file.session)
        .bind(created_by)
        .bind(&owner_key)
        .bind(&file.slot_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "user_files", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredFile>> {
        let record = sqlx::query_as::<Postgres, StoredFile>(&format!(
            "SELECT {} FROM user_files WHERE id = $1 AND deleted_at IS NULL",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "user_files", db.operation = "select"))]
    async fn count_duplicates(&self, query: &DuplicateQuery) -> RepositoryResult<i64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM user_files WHERE deleted_at IS NULL AND derived_from IS NULL AND owner_key = ",
        );
        builder.push_bind(query.owner.key());

        for (field, value) in &query.criteria {
            builder.push(" AND ").push(field.column()).push(" = ");
            match value {
                FieldValue::Int(v) => builder.push_bind(*v),
                FieldValue::Text(v) => builder.push_bind(v.clone()),
            };
        }

        if let Some(exclude) = query.exclude_id {
            builder.push(" AND id <> ").push_bind(exclude);
        }

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "user_files", db.operation = "select"))]
    async fn count_by_key(&self, path: &str, file: &str) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM user_files WHERE path = $1 AND file = $2 AND deleted_at IS NULL",
        )
        .bind(path)
        .bind(file)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self, update),fields(db.table = "user_files", db.operation = "update", db.record_id = %id))]
    async fn replace_content(
        &self,
        id: Uuid,
        update: ContentUpdate,
    ) -> RepositoryResult<StoredFile> {
        let record = sqlx::query_as::<Postgres, StoredFile>(&format!(
            r#"
            UPDATE user_files
            SET name = $2, ext = $3, mime = $4, size = $5, width = $6, height = $7,
                hash = $8, path = $9, file = $10, url = $11, properties = $12,
                slot_key = $13, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.ext)
        .bind(&update.mime)
        .bind(update.size)
        .bind(update.width)
        .bind(update.height)
        .bind(&update.hash)
        .bind(&update.path)
        .bind(&update.file)
        .bind(&update.url)
        .bind(&update.properties)
        .bind(&update.slot_key)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(RepositoryError::NotFound(id))
    }

    #[tracing::instrument(skip(self), fields(db.table = "user_files", db.operation = "select", db.record_id = %parent_id))]
    async fn list_children(&self, parent_id: Uuid) -> RepositoryResult<Vec<StoredFile>> {
        let records = sqlx::query_as::<Postgres, StoredFile>(&format!(
            "SELECT {} FROM user_files WHERE derived_from = $1 AND deleted_at IS NULL ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(db.table = "user_files", db.operation = "delete", db.record_id = %id))]
    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM user_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
