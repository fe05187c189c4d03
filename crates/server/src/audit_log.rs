use procura_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events into the structured log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        let session_id = event.session_id.as_deref().unwrap_or("none");

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = "audit.event",
                correlation_id = %event.correlation_id,
                audit_event_id = %event.event_id,
                audit_event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                session_id = %session_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded"
            ),
            _ => warn!(
                event_name = "audit.event",
                correlation_id = %event.correlation_id,
                audit_event_id = %event.event_id,
                audit_event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                session_id = %session_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded with non-success outcome"
            ),
        }
    }
}
