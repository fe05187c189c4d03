use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{
    format_timestamp, parse_timestamp, ObjectStore, ObjectSummary, PutMode, StoreError,
    StoredObject,
};
use crate::DbPool;

pub struct SqlObjectStore {
    pool: DbPool,
}

impl SqlObjectStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ObjectStore for SqlObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let row = sqlx::query(
            "SELECT key, body, content_type, size, last_modified FROM object_blob WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(object_from_row).transpose()
    }

    async fn put(
        &self,
        key: &str,
        body: String,
        content_type: &str,
        mode: PutMode,
    ) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("object key must not be empty".to_string()));
        }

        let size = i64::try_from(body.len())
            .map_err(|_| StoreError::InvalidKey(format!("object `{key}` is too large")))?;
        let last_modified = format_timestamp(&Utc::now());

        let statement = match mode {
            PutMode::Overwrite => {
                "INSERT INTO object_blob (key, body, content_type, size, last_modified)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                    body = excluded.body,
                    content_type = excluded.content_type,
                    size = excluded.size,
                    last_modified = excluded.last_modified"
            }
            PutMode::CreateOnly => {
                "INSERT INTO object_blob (key, body, content_type, size, last_modified)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(key) DO NOTHING"
            }
        };

        let result = sqlx::query(statement)
            .bind(key)
            .bind(body)
            .bind(content_type)
            .bind(size)
            .bind(last_modified)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(
                event_name = "store.object.conflict",
                correlation_id = "store",
                key = %key,
                "create-only put found an existing object"
            );
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, size, last_modified FROM object_blob
             WHERE substr(key, 1, length(?1)) = ?1 AND (?2 IS NULL OR key > ?2)
             ORDER BY key
             LIMIT ?3",
        )
        .bind(prefix)
        .bind(start_after)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM object_blob WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        debug!(event_name = "store.object.deleted", correlation_id = "store", key = %key, deleted);
        Ok(deleted)
    }
}

fn object_from_row(row: &SqliteRow) -> Result<StoredObject, StoreError> {
    Ok(StoredObject {
        key: row.try_get("key")?,
        body: row.try_get("body")?,
        content_type: row.try_get("content_type")?,
        size: parse_size(row.try_get("size")?)?,
        last_modified: parse_timestamp(&row.try_get::<String, _>("last_modified")?)?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<ObjectSummary, StoreError> {
    Ok(ObjectSummary {
        key: row.try_get("key")?,
        size: parse_size(row.try_get("size")?)?,
        last_modified: parse_timestamp(&row.try_get::<String, _>("last_modified")?)?,
    })
}

fn parse_size(raw: i64) -> Result<usize, StoreError> {
    usize::try_from(raw).map_err(|_| StoreError::Decode(format!("invalid object size `{raw}`")))
}

pub(crate) fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
