//! Single entry point between the model loop and tool handlers.
//!
//! `dispatch` never fails: unknown tools, handler errors and handler panics
//! all come back as a [`ToolResult`] the model can read and react to.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use procura_core::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TenantContext,
    TenantResolver,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::tools::{ToolError, ToolRegistry};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub input: Value,
    pub session_id: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, input: Value, session_id: impl Into<String>) -> Self {
        Self { tool_name: tool_name.into(), input, session_id: session_id.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    HandlerFailure,
    NotFound,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::HandlerFailure => "handler_failure",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub ok: bool,
    pub payload: Option<Value>,
    pub error_kind: Option<ToolErrorKind>,
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, payload: Value) -> Self {
        Self {
            tool: tool.into(),
            ok: true,
            payload: Some(payload),
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failure(
        tool: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            ok: false,
            payload: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Shape the model sees: the flat handler payload on success, or
    /// `{"error", "tool"}` on failure.
    pub fn to_wire(&self) -> Value {
        if self.ok {
            return match &self.payload {
                Some(Value::Object(map)) => Value::Object(map.clone()),
                Some(other) => json!({ "result": other }),
                None => Value::Object(Map::new()),
            };
        }

        json!({
            "error": self.error_message.as_deref().unwrap_or("tool failed"),
            "tool": self.tool,
        })
    }

    pub fn to_wire_string(&self) -> String {
        serde_json::to_string(&self.to_wire()).unwrap_or_else(|error| {
            format!(
                "{{\"error\":\"result could not be encoded: {}\",\"tool\":{}}}",
                error.to_string().replace('"', "'"),
                Value::String(self.tool.clone())
            )
        })
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    resolver: TenantResolver,
    audit: Arc<dyn AuditSink>,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        resolver: TenantResolver,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { registry, resolver, audit }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.dispatch_with_correlation(call, &Uuid::new_v4().to_string()).await
    }

    pub async fn dispatch_with_correlation(
        &self,
        call: &ToolCall,
        correlation_id: &str,
    ) -> ToolResult {
        let tenant = self.resolver.resolve(Some(call.session_id.as_str()));
        let started = Instant::now();

        let result = match self.registry.get(&call.tool_name) {
            None => ToolResult::failure(
                call.tool_name.as_str(),
                ToolErrorKind::UnknownTool,
                format!(
                    "unknown tool `{}`; available tools: {}",
                    call.tool_name,
                    self.registry.names().join(", ")
                ),
            ),
            Some(tool) => {
                let execution = AssertUnwindSafe(tool.execute(
                    call.input.clone(),
                    &tenant,
                    &call.session_id,
                ))
                .catch_unwind()
                .await;

                match execution {
                    Ok(Ok(payload)) => ToolResult::success(call.tool_name.as_str(), payload),
                    Ok(Err(error)) => failure_from_error(&call.tool_name, error),
                    Err(panic) => {
                        let message = format!("handler panicked: {}", panic_message(&*panic));
                        ToolResult::failure(
                            call.tool_name.as_str(),
                            ToolErrorKind::HandlerFailure,
                            with_hint(&call.tool_name, &message),
                        )
                    }
                }
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.record(call, &tenant, correlation_id, &result, duration_ms);
        result
    }

    fn record(
        &self,
        call: &ToolCall,
        tenant: &TenantContext,
        correlation_id: &str,
        result: &ToolResult,
        duration_ms: u64,
    ) {
        let context = AuditContext::new(
            tenant.tenant_id.clone(),
            Some(call.session_id.clone()),
            correlation_id,
            tenant.user_id.clone(),
        );

        if result.ok {
            info!(
                event_name = "tool.dispatch.completed",
                correlation_id,
                tenant_id = %tenant.tenant_id,
                user_id = %tenant.user_id,
                tool = %call.tool_name,
                duration_ms,
                "tool call completed"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    &context,
                    "tool.dispatched",
                    AuditCategory::Tool,
                    AuditOutcome::Success,
                )
                .with_metadata("tool", call.tool_name.clone()),
            );
            return;
        }

        let kind = result.error_kind.map(|kind| kind.as_str()).unwrap_or("unknown");
        warn!(
            event_name = "tool.dispatch.failed",
            correlation_id,
            tenant_id = %tenant.tenant_id,
            user_id = %tenant.user_id,
            tool = %call.tool_name,
            error_kind = kind,
            error = result.error_message.as_deref().unwrap_or_default(),
            duration_ms,
            "tool call failed"
        );
        let outcome = match result.error_kind {
            Some(ToolErrorKind::UnknownTool) => AuditOutcome::Rejected,
            _ => AuditOutcome::Failed,
        };
        self.audit.emit(
            AuditEvent::from_context(&context, "tool.failed", AuditCategory::Tool, outcome)
                .with_metadata("tool", call.tool_name.clone())
                .with_metadata("error_kind", kind),
        );
    }
}

fn failure_from_error(tool: &str, error: ToolError) -> ToolResult {
    match error {
        ToolError::NotFound(message) => ToolResult::failure(
            tool,
            ToolErrorKind::NotFound,
            format!("{message}; verify the identifier or create the record first"),
        ),
        other => ToolResult::failure(
            tool,
            ToolErrorKind::HandlerFailure,
            with_hint(tool, &other.to_string()),
        ),
    }
}

fn with_hint(tool: &str, message: &str) -> String {
    format!("{tool} failed: {message}; check the input against the tool schema and retry")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use procura_core::audit::InMemoryAuditSink;
    use procura_core::{AuditOutcome, TenantContext, TenantResolver};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use super::{ToolCall, ToolDispatcher, ToolErrorKind, ToolResult};
    use crate::tools::{Tool, ToolError, ToolRegistry};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(TenantContext, String)>>>,
    }

    #[async_trait]
    impl Tool for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn description(&self) -> &'static str {
            "Records the context it was called with"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(
            &self,
            _input: Value,
            tenant: &TenantContext,
            session_id: &str,
        ) -> Result<Value, ToolError> {
            self.calls
                .lock()
                .expect("lock")
                .push((tenant.clone(), session_id.to_string()));
            Ok(json!({"amount": procura_db::AttributeValue::N(Decimal::new(12_550, 2)).to_json()}))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _: Value, _: &TenantContext, _: &str) -> Result<Value, ToolError> {
            Err(ToolError::Internal("store unavailable".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Tool for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn description(&self) -> &'static str {
            "Panics"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _: Value, _: &TenantContext, _: &str) -> Result<Value, ToolError> {
            panic!("boom")
        }
    }

    fn dispatcher(recorder: Recorder, sink: InMemoryAuditSink) -> ToolDispatcher {
        let registry = ToolRegistry::default().with(recorder).with(Failing).with(Panicking);
        ToolDispatcher::new(Arc::new(registry), TenantResolver::default(), Arc::new(sink))
    }

    #[tokio::test]
    async fn dispatch_invokes_exactly_one_handler_with_resolved_context() {
        let recorder = Recorder::default();
        let dispatcher = dispatcher(recorder.clone(), InMemoryAuditSink::default());

        let result = dispatcher.dispatch(&ToolCall::new("recorder", json!({}), "ws-abc")).await;

        assert!(result.ok);
        let calls = recorder.calls.lock().expect("lock").clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, TenantContext::new("demo-tenant", "ws-abc"));
        assert_eq!(calls[0].1, "ws-abc");
        assert_eq!(result.to_wire(), json!({"amount": 125.5}));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_raised() {
        let sink = InMemoryAuditSink::default();
        let dispatcher = dispatcher(Recorder::default(), sink.clone());

        let result = dispatcher.dispatch(&ToolCall::new("nonexistent", json!({}), "s")).await;

        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ToolErrorKind::UnknownTool));
        let wire = result.to_wire();
        assert_eq!(wire["tool"], "nonexistent");
        assert!(wire["error"].as_str().is_some_and(|error| error.contains("recorder")));
        assert_eq!(sink.events()[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_handler_failures() {
        let dispatcher = dispatcher(Recorder::default(), InMemoryAuditSink::default());

        let failed = dispatcher.dispatch(&ToolCall::new("failing", json!({}), "s")).await;
        assert_eq!(failed.error_kind, Some(ToolErrorKind::HandlerFailure));
        assert!(failed.error_message.as_deref().is_some_and(|m| m.contains("store unavailable")));

        let panicked = dispatcher.dispatch(&ToolCall::new("panicking", json!({}), "s")).await;
        assert_eq!(panicked.error_kind, Some(ToolErrorKind::HandlerFailure));
        assert!(panicked.error_message.as_deref().is_some_and(|m| m.contains("boom")));

        let after = dispatcher.dispatch(&ToolCall::new("recorder", json!({}), "s")).await;
        assert!(after.ok);
    }

    #[test]
    fn non_object_payloads_are_wrapped() {
        let result = ToolResult::success("list", json!(["a", "b"]));
        assert_eq!(result.to_wire(), json!({"result": ["a", "b"]}));
        assert!(result.to_wire_string().starts_with('{'));
    }
}
