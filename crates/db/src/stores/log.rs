use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::object::clamp_limit;
use super::{format_timestamp, parse_timestamp, LogEvent, LogQuery, LogStore, StoreError};
use crate::DbPool;

pub struct SqlLogStore {
    pool: DbPool,
}

impl SqlLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LogStore for SqlLogStore {
    async fn append(&self, group: &str, message: &str) -> Result<(), StoreError> {
        if group.is_empty() {
            return Err(StoreError::InvalidKey("log group must not be empty".to_string()));
        }

        sqlx::query("INSERT INTO log_event (group_name, occurred_at, message) VALUES (?, ?, ?)")
            .bind(group)
            .bind(format_timestamp(&Utc::now()))
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_groups(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT group_name FROM log_event
             WHERE substr(group_name, 1, length(?1)) = ?1
             ORDER BY group_name",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        let groups = rows
            .iter()
            .map(|row| row.try_get::<String, _>("group_name"))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(groups)
    }

    async fn filter_events(
        &self,
        group: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT group_name, occurred_at, message FROM log_event
             WHERE group_name = ?1
               AND (?2 IS NULL OR instr(lower(message), lower(?2)) > 0)
               AND (?3 IS NULL OR occurred_at >= ?3)
               AND (?4 IS NULL OR occurred_at <= ?4)
             ORDER BY occurred_at DESC, id DESC
             LIMIT ?5",
        )
        .bind(group)
        .bind(query.filter.as_deref())
        .bind(query.since.as_ref().map(format_timestamp))
        .bind(query.until.as_ref().map(format_timestamp))
        .bind(clamp_limit(query.limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: &SqliteRow) -> Result<LogEvent, StoreError> {
    Ok(LogEvent {
        group: row.try_get("group_name")?,
        timestamp: parse_timestamp(&row.try_get::<String, _>("occurred_at")?)?,
        message: row.try_get("message")?,
    })
}
