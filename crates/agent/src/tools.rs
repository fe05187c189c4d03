use std::collections::BTreeMap;

use async_trait::async_trait;
use procura_core::{TenantContext, WorkflowError};
use procura_db::StoreError;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::ToolSpec;
use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("render failure: {0}")]
    Render(#[from] RenderError),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<WorkflowError> for ToolError {
    fn from(error: WorkflowError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

/// A named operation the model may invoke.
///
/// Every handler receives the same arguments; those that only need the tenant
/// ignore `session_id`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema advertised to the model.
    fn input_schema(&self) -> Value;

    async fn execute(
        &self,
        input: Value,
        tenant: &TenantContext,
        session_id: &str,
    ) -> Result<Value, ToolError>;
}

/// Name-to-handler table. Populated during startup, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn with<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub(crate) fn input_object(input: &Value) -> Result<&Map<String, Value>, ToolError> {
    input.as_object().ok_or_else(|| ToolError::InvalidInput("input must be a JSON object".into()))
}

pub(crate) fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    optional_str(input, field)
        .ok_or_else(|| ToolError::InvalidInput(format!("`{field}` is required")))
}

pub(crate) fn optional_str<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn optional_limit(input: &Value, default: usize, max: usize) -> usize {
    input
        .get("limit")
        .and_then(Value::as_u64)
        .and_then(|limit| usize::try_from(limit).ok())
        .unwrap_or(default)
        .clamp(1, max)
}
