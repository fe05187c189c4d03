use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use procura_core::domain::intake::{intake_key, intake_partition, INTAKE_KEY_PREFIX};
use procura_core::{IntakeItemId, TenantContext};
use procura_db::stores::attribute::item_to_json;
use procura_db::stores::{PARTITION_KEY, SORT_KEY};
use procura_db::{AttributeValue, Item, KeyValueStore};
use serde_json::{json, Map, Value};

use super::unknown_operation;
use crate::locks::ItemLocks;
use crate::tools::{input_object, optional_limit, optional_str, required_str, Tool, ToolError};

const OPERATIONS: [&str; 4] = ["create", "get", "update", "list"];
const INITIAL_STATUS: &str = "draft";

/// Intake records in the key-value store, partitioned per tenant.
pub struct IntakeRecordsTool {
    records: Arc<dyn KeyValueStore>,
    locks: ItemLocks,
}

impl IntakeRecordsTool {
    pub fn new(records: Arc<dyn KeyValueStore>, locks: ItemLocks) -> Self {
        Self { records, locks }
    }

    async fn create(&self, input: &Value, tenant: &TenantContext) -> Result<Value, ToolError> {
        let fields = fields_from(input, false)?;
        let item_id = IntakeItemId::generate();
        let key = intake_key(tenant, &item_id);
        let now = Utc::now();

        let mut item = Item::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.pk));
        item.insert(SORT_KEY.to_string(), AttributeValue::S(key.sk));
        item.insert("item_id".to_string(), AttributeValue::string(item_id.0.as_str()));
        item.insert(
            "status".to_string(),
            AttributeValue::string(optional_str(input, "status").unwrap_or(INITIAL_STATUS)),
        );
        item.insert("created_at".to_string(), AttributeValue::Timestamp(now));
        item.insert("updated_at".to_string(), AttributeValue::Timestamp(now));
        item.insert("fields".to_string(), AttributeValue::from_json(&Value::Object(fields)));

        let payload = record_payload(&item);
        self.records.put_item(item).await?;
        Ok(payload)
    }

    async fn get(&self, input: &Value, tenant: &TenantContext) -> Result<Value, ToolError> {
        let (item_id, item) = self.load(input, tenant).await?;
        item.map(|item| record_payload(&item))
            .ok_or_else(|| ToolError::NotFound(format!("intake record `{}` not found", item_id.0)))
    }

    async fn update(&self, input: &Value, tenant: &TenantContext) -> Result<Value, ToolError> {
        let item_id = IntakeItemId(required_str(input, "item_id")?.to_string());
        let key = intake_key(tenant, &item_id);
        let _guard = self.locks.acquire(&key.pk, &key.sk).await;

        let mut item = self.records.get_item(&key.pk, &key.sk).await?.ok_or_else(|| {
            ToolError::NotFound(format!("intake record `{}` not found", item_id.0))
        })?;

        let updates = fields_from(input, true)?;
        let mut fields = item
            .get("fields")
            .and_then(AttributeValue::as_map)
            .cloned()
            .unwrap_or_default();
        for (name, value) in &updates {
            fields.insert(name.clone(), AttributeValue::from_json(value));
        }
        item.insert("fields".to_string(), AttributeValue::M(fields));
        if let Some(status) = optional_str(input, "status") {
            item.insert("status".to_string(), AttributeValue::string(status));
        }
        item.insert("updated_at".to_string(), AttributeValue::Timestamp(Utc::now()));

        let payload = record_payload(&item);
        self.records.put_item(item).await?;
        Ok(payload)
    }

    async fn list(&self, input: &Value, tenant: &TenantContext) -> Result<Value, ToolError> {
        let limit = optional_limit(input, 50, 200);
        let items = self
            .records
            .query(&intake_partition(tenant), Some(INTAKE_KEY_PREFIX), limit)
            .await?;
        let records: Vec<Value> = items.iter().map(record_payload).collect();
        Ok(json!({"count": records.len(), "records": records}))
    }

    async fn load(
        &self,
        input: &Value,
        tenant: &TenantContext,
    ) -> Result<(IntakeItemId, Option<Item>), ToolError> {
        let item_id = IntakeItemId(required_str(input, "item_id")?.to_string());
        let key = intake_key(tenant, &item_id);
        let item = self.records.get_item(&key.pk, &key.sk).await?;
        Ok((item_id, item))
    }
}

#[async_trait]
impl Tool for IntakeRecordsTool {
    fn name(&self) -> &'static str {
        "intake_records"
    }

    fn description(&self) -> &'static str {
        "Create, fetch, update or list acquisition intake records for the current organization. \
         Record ids are assigned by the system on create."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": OPERATIONS},
                "item_id": {"type": "string", "description": "Required for get and update"},
                "fields": {"type": "object", "description": "Intake fields to store or merge"},
                "status": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 200}
            },
            "required": ["operation"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        tenant: &TenantContext,
        _session_id: &str,
    ) -> Result<Value, ToolError> {
        match required_str(&input, "operation")? {
            "create" => self.create(&input, tenant).await,
            "get" => self.get(&input, tenant).await,
            "update" => self.update(&input, tenant).await,
            "list" => self.list(&input, tenant).await,
            other => Err(unknown_operation(self.name(), other, &OPERATIONS)),
        }
    }
}

fn fields_from(input: &Value, required: bool) -> Result<Map<String, Value>, ToolError> {
    match input_object(input)?.get("fields") {
        Some(Value::Object(fields)) => Ok(fields.clone()),
        None | Some(Value::Null) if !required => Ok(Map::new()),
        None | Some(Value::Null) => {
            Err(ToolError::InvalidInput("`fields` is required".to_string()))
        }
        Some(_) => Err(ToolError::InvalidInput("`fields` must be an object".to_string())),
    }
}

/// Plain-JSON view of a record without the storage keys.
fn record_payload(item: &Item) -> Value {
    let mut payload = item_to_json(item);
    if let Value::Object(map) = &mut payload {
        map.remove(PARTITION_KEY);
        map.remove(SORT_KEY);
    }
    payload
}
