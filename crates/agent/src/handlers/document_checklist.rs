use async_trait::async_trait;
use procura_core::TenantContext;
use serde_json::{json, Value};

use super::to_payload;
use crate::checklist::ChecklistTracker;
use crate::tools::{Tool, ToolError};

pub struct DocumentChecklistTool {
    checklist: ChecklistTracker,
}

impl DocumentChecklistTool {
    pub fn new(checklist: ChecklistTracker) -> Self {
        Self { checklist }
    }
}

#[async_trait]
impl Tool for DocumentChecklistTool {
    fn name(&self) -> &'static str {
        "document_checklist"
    }

    fn description(&self) -> &'static str {
        "Show which of the ten acquisition documents have been generated for this user. \
         A document counts as complete only once it has been created."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _input: Value,
        tenant: &TenantContext,
        _session_id: &str,
    ) -> Result<Value, ToolError> {
        let checklist = self.checklist.checklist(tenant).await?;
        to_payload(&checklist)
    }
}
