use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use procura_core::tenant::normalize_suffix;
use procura_core::TenantContext;
use procura_db::{LogQuery, LogStore};
use serde_json::{json, Value};

use super::unknown_operation;
use crate::tools::{optional_limit, optional_str, required_str, Tool, ToolError};

const OPERATIONS: [&str; 2] = ["groups", "query"];
const MAX_LOOKBACK_MINUTES: i64 = 7 * 24 * 60;

/// Read-only access to operational logs. Groups are shared by a tenant's users
/// and named `{tenant}/...`.
pub struct LogSearchTool {
    logs: Arc<dyn LogStore>,
}

impl LogSearchTool {
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl Tool for LogSearchTool {
    fn name(&self) -> &'static str {
        "log_search"
    }

    fn description(&self) -> &'static str {
        "List the organization's log groups or search one group for recent events. \
         Use this to diagnose failed uploads or submissions."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": OPERATIONS},
                "group": {
                    "type": "string",
                    "description": "Log group, relative to the organization"
                },
                "prefix": {"type": "string", "description": "Group prefix for groups"},
                "filter": {"type": "string", "description": "Case-insensitive text match"},
                "since_minutes": {"type": "integer", "minimum": 1},
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
        match required_str(&input, "operation")? {
            "groups" => {
                let prefix =
                    tenant_group(tenant, optional_str(&input, "prefix").unwrap_or_default());
                let groups = self.logs.list_groups(&prefix).await?;
                Ok(json!({"count": groups.len(), "groups": groups}))
            }
            "query" => {
                let group = tenant_group(tenant, required_str(&input, "group")?);
                if group == tenant.log_group_prefix() {
                    return Err(ToolError::InvalidInput(
                        "`group` must name a log group".to_string(),
                    ));
                }

                let since = input.get("since_minutes").and_then(Value::as_i64).map(|minutes| {
                    Utc::now() - Duration::minutes(minutes.clamp(1, MAX_LOOKBACK_MINUTES))
                });
                let query = LogQuery {
                    filter: optional_str(&input, "filter").map(str::to_string),
                    since,
                    until: None,
                    limit: optional_limit(&input, 50, 500),
                };

                let events = self.logs.filter_events(&group, &query).await?;
                let events: Vec<Value> = events
                    .iter()
                    .map(|event| {
                        json!({"timestamp": event.timestamp.to_rfc3339(), "message": event.message})
                    })
                    .collect();
                Ok(json!({"group": group, "count": events.len(), "events": events}))
            }
            other => Err(unknown_operation(self.name(), other, &OPERATIONS)),
        }
    }
}

/// Maps a caller-supplied group name into the tenant's namespace. Names that
/// already carry the tenant prefix are accepted as-is.
fn tenant_group(tenant: &TenantContext, raw: &str) -> String {
    let prefix = tenant.log_group_prefix();
    let relative = raw.strip_prefix(prefix.as_str()).unwrap_or(raw);
    format!("{prefix}{}", normalize_suffix(relative))
}
