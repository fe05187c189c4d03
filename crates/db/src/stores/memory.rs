use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::Utc;
use tokio::sync::RwLock;

use super::attribute::item_key;
use super::{
    Item, KeyValueStore, LogEvent, LogQuery, LogStore, ObjectStore, ObjectSummary, PutMode,
    StoreError, StoredObject,
};

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned())
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

        let mut objects = self.objects.write().await;
        if mode == PutMode::CreateOnly && objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let object = StoredObject {
            key: key.to_string(),
            size: body.len(),
            body,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let objects = self.objects.read().await;
        let lower = match start_after {
            Some(key) if key >= prefix => Bound::Excluded(key.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };
        Ok(objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(_, object)| ObjectSummary::from(object))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut objects = self.objects.write().await;
        Ok(objects.remove(key).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    items: RwLock<BTreeMap<(String, String), Item>>,
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        let key = item_key(&item)?;
        let mut items = self.items.write().await;
        items.insert(key, item);
        Ok(())
    }

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let items = self.items.read().await;
        Ok(items.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    async fn query(
        &self,
        pk: &str,
        sk_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        let items = self.items.read().await;
        let sk_prefix = sk_prefix.unwrap_or_default();
        Ok(items
            .range((pk.to_string(), sk_prefix.to_string())..)
            .take_while(|((item_pk, item_sk), _)| item_pk == pk && item_sk.starts_with(sk_prefix))
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryLogStore {
    groups: RwLock<BTreeMap<String, Vec<LogEvent>>>,
}

impl InMemoryLogStore {
    /// Inserts an event with an explicit timestamp.
    pub async fn record(&self, event: LogEvent) {
        let mut groups = self.groups.write().await;
        groups.entry(event.group.clone()).or_default().push(event);
    }
}

#[async_trait::async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, group: &str, message: &str) -> Result<(), StoreError> {
        if group.is_empty() {
            return Err(StoreError::InvalidKey("log group must not be empty".to_string()));
        }
        self.record(LogEvent {
            group: group.to_string(),
            timestamp: Utc::now(),
            message: message.to_string(),
        })
        .await;
        Ok(())
    }

    async fn list_groups(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let groups = self.groups.read().await;
        Ok(groups.keys().filter(|group| group.starts_with(prefix)).cloned().collect())
    }

    async fn filter_events(
        &self,
        group: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogEvent>, StoreError> {
        let groups = self.groups.read().await;
        let Some(events) = groups.get(group) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<LogEvent> =
            events.iter().filter(|event| query.matches(event)).cloned().collect();
        matching.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        matching.truncate(query.limit);
        Ok(matching)
    }
}
