use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use procura_core::domain::document::artifact_key;
use procura_core::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, DocumentType, DomainError,
    GeneratedDocument, TenantContext,
};
use procura_db::{ObjectStore, PutMode, StoreError};
use serde_json::{json, Value};
use tracing::info;

use super::tool_audit_context;
use crate::render::DocumentRenderer;
use crate::tools::{optional_str, required_str, Tool, ToolError};

/// Same-second generations get `_2` .. `_9` suffixes before giving up.
const MAX_KEY_ATTEMPTS: u32 = 9;
const PREVIEW_CHARS: usize = 280;
const ARTIFACT_CONTENT_TYPE: &str = "text/markdown";

pub struct CreateDocumentTool {
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<DocumentRenderer>,
    audit: Arc<dyn AuditSink>,
}

impl CreateDocumentTool {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<DocumentRenderer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { objects, renderer, audit }
    }

    /// Renders and stores a new artifact. Existing artifacts are never
    /// replaced; a key collision moves on to the next suffix.
    pub async fn generate(
        &self,
        tenant: &TenantContext,
        doc_type: DocumentType,
        title: &str,
        data: &Value,
    ) -> Result<GeneratedDocument, ToolError> {
        let created_at = Utc::now();
        let content = self.renderer.render(doc_type, title, data, created_at)?;

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            let key = artifact_key(tenant, doc_type, created_at, attempt);
            match self
                .objects
                .put(&key, content.clone(), ARTIFACT_CONTENT_TYPE, PutMode::CreateOnly)
                .await
            {
                Ok(()) => {
                    return Ok(GeneratedDocument {
                        doc_type,
                        title: title.to_string(),
                        content,
                        artifact_key: key,
                        created_at,
                    })
                }
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Err(ToolError::Internal(format!(
            "could not allocate a unique key for {doc_type} after {MAX_KEY_ATTEMPTS} attempts"
        )))
    }
}

#[async_trait]
impl Tool for CreateDocumentTool {
    fn name(&self) -> &'static str {
        "create_document"
    }

    fn description(&self) -> &'static str {
        "Generate an acquisition document from the collected intake details and save it to the \
         user's documents. Each call creates a new version; existing documents are never replaced."
    }

    fn input_schema(&self) -> Value {
        let doc_types: Vec<&str> = DocumentType::ALL.iter().map(DocumentType::as_str).collect();
        json!({
            "type": "object",
            "properties": {
                "doc_type": {"type": "string", "enum": doc_types},
                "title": {"type": "string"},
                "data": {
                    "type": "object",
                    "description": "Details such as description, estimated_cost, \
                                    period_of_performance, requester"
                }
            },
            "required": ["doc_type"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        tenant: &TenantContext,
        session_id: &str,
    ) -> Result<Value, ToolError> {
        let doc_type: DocumentType =
            required_str(&input, "doc_type")?.parse().map_err(|error: DomainError| {
                ToolError::InvalidInput(error.to_string())
            })?;
        let title = optional_str(&input, "title").unwrap_or(doc_type.display_name()).to_string();
        let data = input.get("data").cloned().unwrap_or(Value::Null);

        let document = self.generate(tenant, doc_type, &title, &data).await?;

        info!(
            event_name = "document.generated",
            correlation_id = %session_id,
            tenant_id = %tenant.tenant_id,
            user_id = %tenant.user_id,
            doc_type = doc_type.as_str(),
            artifact_key = %document.artifact_key,
            "document generated"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &tool_audit_context(tenant, session_id),
                "document.generated",
                AuditCategory::Document,
                AuditOutcome::Success,
            )
            .with_metadata("doc_type", doc_type.as_str())
            .with_metadata("artifact_key", document.artifact_key.clone()),
        );

        let preview: String = document.content.chars().take(PREVIEW_CHARS).collect();
        Ok(json!({
            "doc_type": document.doc_type,
            "title": document.title,
            "artifact_key": document.artifact_key,
            "created_at": document.created_at.to_rfc3339(),
            "size": document.content.len(),
            "preview": preview,
        }))
    }
}
