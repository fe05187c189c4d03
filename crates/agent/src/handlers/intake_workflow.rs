use std::sync::Arc;

use async_trait::async_trait;
use procura_core::TenantContext;
use serde_json::{json, Value};

use super::{to_payload, tool_audit_context, unknown_operation};
use crate::tools::{required_str, Tool, ToolError};
use crate::workflow::WorkflowService;

const ACTIONS: [&str; 3] = ["start", "advance", "status"];

pub struct IntakeWorkflowTool {
    workflows: Arc<WorkflowService>,
}

impl IntakeWorkflowTool {
    pub fn new(workflows: Arc<WorkflowService>) -> Self {
        Self { workflows }
    }
}

#[async_trait]
impl Tool for IntakeWorkflowTool {
    fn name(&self) -> &'static str {
        "intake_workflow"
    }

    fn description(&self) -> &'static str {
        "Track the intake process: start a workflow for a new acquisition, report completed \
         actions to advance it, or fetch its status. Stages advance only from completed actions."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ACTIONS},
                "description": {"type": "string", "description": "Acquisition summary for start"},
                "workflow_id": {"type": "string", "description": "Required for advance and status"},
                "completed_actions": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["action"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        tenant: &TenantContext,
        session_id: &str,
    ) -> Result<Value, ToolError> {
        let audit = tool_audit_context(tenant, session_id);
        match required_str(&input, "action")? {
            "start" => {
                let description = required_str(&input, "description")?;
                to_payload(&self.workflows.start(tenant, description, &audit).await?)
            }
            "advance" => {
                let workflow_id = required_str(&input, "workflow_id")?;
                let actions = completed_actions(&input)?;
                to_payload(&self.workflows.advance(tenant, workflow_id, &actions, &audit).await?)
            }
            "status" => {
                let workflow_id = required_str(&input, "workflow_id")?;
                to_payload(&self.workflows.status(tenant, workflow_id).await?)
            }
            other => Err(unknown_operation(self.name(), other, &ACTIONS)),
        }
    }
}

fn completed_actions(input: &Value) -> Result<Vec<String>, ToolError> {
    match input.get("completed_actions") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(actions)) => actions
            .iter()
            .map(|action| {
                action.as_str().map(str::to_string).ok_or_else(|| {
                    ToolError::InvalidInput("`completed_actions` must contain strings".to_string())
                })
            })
            .collect(),
        Some(Value::String(action)) => Ok(vec![action.clone()]),
        Some(_) => Err(ToolError::InvalidInput("`completed_actions` must be an array".to_string())),
    }
}
