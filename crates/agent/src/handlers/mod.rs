//! Tool handlers registered with the dispatcher.

use std::sync::Arc;

use procura_core::{AuditContext, AuditSink, TenantContext};
use procura_db::{KeyValueStore, LogStore, ObjectStore};
use serde::Serialize;
use serde_json::Value;

use crate::checklist::ChecklistTracker;
use crate::locks::ItemLocks;
use crate::render::DocumentRenderer;
use crate::tools::{ToolError, ToolRegistry};
use crate::workflow::WorkflowService;

pub mod create_document;
pub mod document_checklist;
pub mod document_store;
pub mod intake_records;
pub mod intake_workflow;
pub mod log_search;

pub use create_document::CreateDocumentTool;
pub use document_checklist::DocumentChecklistTool;
pub use document_store::DocumentStoreTool;
pub use intake_records::IntakeRecordsTool;
pub use intake_workflow::IntakeWorkflowTool;
pub use log_search::LogSearchTool;

/// Long-lived collaborators shared by all handlers.
#[derive(Clone)]
pub struct ToolDependencies {
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<dyn KeyValueStore>,
    pub logs: Arc<dyn LogStore>,
    pub renderer: Arc<DocumentRenderer>,
    pub audit: Arc<dyn AuditSink>,
    /// Serialises read-modify-write cycles on intake and workflow records.
    pub locks: ItemLocks,
}

impl ToolDependencies {
    pub fn checklist(&self) -> ChecklistTracker {
        ChecklistTracker::new(self.objects.clone())
    }

    pub fn workflows(&self) -> Arc<WorkflowService> {
        Arc::new(WorkflowService::new(
            self.records.clone(),
            self.checklist(),
            self.locks.clone(),
            self.audit.clone(),
        ))
    }
}

/// Builds the full tool table. Called once at startup.
pub fn build_registry(deps: &ToolDependencies) -> ToolRegistry {
    ToolRegistry::default()
        .with(DocumentStoreTool::new(deps.objects.clone()))
        .with(IntakeRecordsTool::new(deps.records.clone(), deps.locks.clone()))
        .with(LogSearchTool::new(deps.logs.clone()))
        .with(CreateDocumentTool::new(
            deps.objects.clone(),
            deps.renderer.clone(),
            deps.audit.clone(),
        ))
        .with(DocumentChecklistTool::new(deps.checklist()))
        .with(IntakeWorkflowTool::new(deps.workflows()))
}

/// Tool calls are correlated by session; the loop has no finer-grained id to
/// hand down.
pub(crate) fn tool_audit_context(tenant: &TenantContext, session_id: &str) -> AuditContext {
    AuditContext::new(
        tenant.tenant_id.clone(),
        Some(session_id.to_string()),
        session_id,
        tenant.user_id.clone(),
    )
}

pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|error| ToolError::Internal(error.to_string()))
}

pub(crate) fn unknown_operation(tool: &str, operation: &str, allowed: &[&str]) -> ToolError {
    ToolError::InvalidInput(format!(
        "{tool} does not support operation `{operation}` (expected one of: {})",
        allowed.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_core::audit::NoopAuditSink;
    use procura_db::{InMemoryKeyValueStore, InMemoryLogStore, InMemoryObjectStore};

    use super::{build_registry, ToolDependencies};
    use crate::locks::ItemLocks;
    use crate::render::DocumentRenderer;

    #[test]
    fn registry_contains_every_tool() {
        let deps = ToolDependencies {
            objects: Arc::new(InMemoryObjectStore::default()),
            records: Arc::new(InMemoryKeyValueStore::default()),
            logs: Arc::new(InMemoryLogStore::default()),
            renderer: Arc::new(DocumentRenderer::new().expect("renderer")),
            audit: Arc::new(NoopAuditSink),
            locks: ItemLocks::default(),
        };

        let registry = build_registry(&deps);

        assert_eq!(
            registry.names(),
            vec![
                "create_document",
                "document_checklist",
                "document_store",
                "intake_records",
                "intake_workflow",
                "log_search",
            ]
        );
        for spec in registry.specs() {
            assert_eq!(spec.input_schema["type"], "object", "{}", spec.name);
            assert!(!spec.description.is_empty());
        }
    }
}
