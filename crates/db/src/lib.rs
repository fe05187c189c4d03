pub mod connection;
pub mod migrations;
pub mod stores;

pub use connection::{connect, connect_with_settings, DbPool};
pub use stores::{
    AttributeValue, InMemoryKeyValueStore, InMemoryLogStore, InMemoryObjectStore, Item,
    KeyValueStore, LogEvent, LogQuery, LogStore, ObjectStore, ObjectSummary, PutMode,
    SqlKeyValueStore, SqlLogStore, SqlObjectStore, StoreError, StoredObject,
};
