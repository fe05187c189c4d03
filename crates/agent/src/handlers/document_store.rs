use std::sync::Arc;

use async_trait::async_trait;
use procura_core::tenant::normalize_suffix;
use procura_core::TenantContext;
use procura_db::{ObjectStore, PutMode};
use serde_json::{json, Value};

use super::unknown_operation;
use crate::tools::{optional_limit, optional_str, required_str, Tool, ToolError};

const OPERATIONS: [&str; 4] = ["list", "read", "write", "delete"];
const DOCUMENTS_SEGMENT: &str = "documents/";

/// Generic reads and writes under the caller's `{tenant}/{user}/` prefix.
///
/// Generated documents are immutable: writes and deletes under `documents/`
/// are refused so the checklist can only be satisfied by `create_document`.
pub struct DocumentStoreTool {
    objects: Arc<dyn ObjectStore>,
}

impl DocumentStoreTool {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl Tool for DocumentStoreTool {
    fn name(&self) -> &'static str {
        "document_store"
    }

    fn description(&self) -> &'static str {
        "List, read, write or delete files in the user's workspace. Keys are relative to the \
         workspace root; generated documents live under documents/ and are read-only."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": OPERATIONS},
                "key": {"type": "string", "description": "Relative key for read, write and delete"},
                "prefix": {"type": "string", "description": "Relative prefix for list"},
                "content": {"type": "string", "description": "Body for write"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 500}
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
        let operation = required_str(&input, "operation")?;
        match operation {
            "list" => {
                let prefix = tenant.scoped_key(optional_str(&input, "prefix").unwrap_or_default());
                let limit = optional_limit(&input, 100, 500);
                let objects = self.objects.list(&prefix, limit).await?;
                let listed: Vec<Value> = objects
                    .iter()
                    .map(|object| {
                        json!({
                            "key": relative_key(tenant, &object.key),
                            "size": object.size,
                            "last_modified": object.last_modified.to_rfc3339(),
                        })
                    })
                    .collect();
                Ok(json!({
                    "prefix": relative_key(tenant, &prefix),
                    "count": listed.len(),
                    "objects": listed,
                }))
            }
            "read" => {
                let relative = object_suffix(&input)?;
                let key = tenant.scoped_key(&relative);
                let object = self
                    .objects
                    .get(&key)
                    .await?
                    .ok_or_else(|| ToolError::NotFound(format!("object `{relative}` not found")))?;
                Ok(json!({
                    "key": relative,
                    "content": object.body,
                    "content_type": object.content_type,
                    "size": object.size,
                    "last_modified": object.last_modified.to_rfc3339(),
                }))
            }
            "write" => {
                let relative = object_suffix(&input)?;
                refuse_documents(&relative)?;
                let content = input
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::InvalidInput("`content` is required".to_string()))?;
                let key = tenant.scoped_key(&relative);
                self.objects
                    .put(&key, content.to_string(), content_type_for(&relative), PutMode::Overwrite)
                    .await?;
                Ok(json!({"key": relative, "size": content.len(), "written": true}))
            }
            "delete" => {
                let relative = object_suffix(&input)?;
                refuse_documents(&relative)?;
                let deleted = self.objects.delete(&tenant.scoped_key(&relative)).await?;
                if !deleted {
                    return Err(ToolError::NotFound(format!("object `{relative}` not found")));
                }
                Ok(json!({"key": relative, "deleted": true}))
            }
            other => Err(unknown_operation(self.name(), other, &OPERATIONS)),
        }
    }
}

fn object_suffix(input: &Value) -> Result<String, ToolError> {
    let suffix = normalize_suffix(required_str(input, "key")?);
    if suffix.is_empty() || suffix.ends_with('/') {
        return Err(ToolError::InvalidInput("`key` must name an object".to_string()));
    }
    Ok(suffix)
}

fn refuse_documents(relative: &str) -> Result<(), ToolError> {
    if relative.starts_with(DOCUMENTS_SEGMENT) {
        return Err(ToolError::InvalidInput(
            "generated documents are read-only; use create_document for new versions".to_string(),
        ));
    }
    Ok(())
}

fn relative_key(tenant: &TenantContext, key: &str) -> String {
    key.strip_prefix(&tenant.key_prefix()).unwrap_or(key).to_string()
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}
