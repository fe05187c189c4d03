use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::attribute::item_key;
use super::object::clamp_limit;
use super::{format_timestamp, Item, KeyValueStore, StoreError};
use crate::DbPool;

/// Items are stored as the serde encoding of their attribute map, which keeps
/// decimals and timestamps exact.
pub struct SqlKeyValueStore {
    pool: DbPool,
}

impl SqlKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        let (pk, sk) = item_key(&item)?;
        let body = serde_json::to_string(&item)
            .map_err(|error| StoreError::Decode(format!("item `{pk}`/`{sk}`: {error}")))?;

        sqlx::query(
            "INSERT INTO kv_item (pk, sk, body, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(pk, sk)
             DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(&pk)
        .bind(&sk)
        .bind(body)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query("SELECT body FROM kv_item WHERE pk = ? AND sk = ?")
            .bind(pk)
            .bind(sk)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn query(
        &self,
        pk: &str,
        sk_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM kv_item
             WHERE pk = ?1 AND substr(sk, 1, length(?2)) = ?2
             ORDER BY sk
             LIMIT ?3",
        )
        .bind(pk)
        .bind(sk_prefix.unwrap_or_default())
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item, StoreError> {
    let raw = row.try_get::<String, _>("body")?;
    serde_json::from_str(&raw).map_err(|error| StoreError::Decode(format!("stored item: {error}")))
}
