//! Storage capabilities used by the tool handlers.
//!
//! Three narrow interfaces stand in for the backing services: an object store
//! for document artifacts, a key-value store for intake records and workflows,
//! and a log store for operational log reads. Each has an in-memory and a
//! SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod attribute;
pub mod key_value;
pub mod log;
pub mod memory;
pub mod object;

pub use attribute::{AttributeValue, Item, PARTITION_KEY, SORT_KEY};
pub use key_value::SqlKeyValueStore;
pub use log::SqlLogStore;
pub use memory::{InMemoryKeyValueStore, InMemoryLogStore, InMemoryObjectStore};
pub use object::SqlObjectStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutMode {
    Overwrite,
    /// Fails with [`StoreError::AlreadyExists`] instead of replacing a key.
    CreateOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub body: String,
    pub content_type: String,
    pub size: usize,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: usize,
    pub last_modified: DateTime<Utc>,
}

impl From<&StoredObject> for ObjectSummary {
    fn from(object: &StoredObject) -> Self {
        Self { key: object.key.clone(), size: object.size, last_modified: object.last_modified }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    async fn put(
        &self,
        key: &str,
        body: String,
        content_type: &str,
        mode: PutMode,
    ) -> Result<(), StoreError>;

    /// Objects whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<ObjectSummary>, StoreError> {
        self.list_after(prefix, None, limit).await
    }

    /// Like [`ObjectStore::list`], resuming after the key `start_after`.
    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectSummary>, StoreError>;

    /// Returns whether an object was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Upserts an item; it must carry string `PK` and `SK` attributes.
    async fn put_item(&self, item: Item) -> Result<(), StoreError>;

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;

    /// Items in partition `pk`, optionally narrowed to a sort-key prefix, in
    /// sort-key order.
    async fn query(
        &self,
        pk: &str,
        sk_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub group: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Case-insensitive substring match on the message.
    pub filter: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl LogQuery {
    pub fn matches(&self, event: &LogEvent) -> bool {
        let after_start = self.since.map_or(true, |since| event.timestamp >= since);
        let before_end = self.until.map_or(true, |until| event.timestamp <= until);
        let text_match = self.filter.as_deref().map_or(true, |filter| {
            event.message.to_lowercase().contains(&filter.to_lowercase())
        });
        after_start && before_end && text_match
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, group: &str, message: &str) -> Result<(), StoreError>;

    async fn list_groups(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Matching events, newest first, at most `query.limit`.
    async fn filter_events(
        &self,
        group: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogEvent>, StoreError>;
}

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| StoreError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}
