pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod tenant;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::checklist::{
    ChecklistStatus, ChecklistSummary, DocumentChecklist, DocumentChecklistItem,
};
pub use domain::document::{DocumentType, GeneratedDocument};
pub use domain::intake::{IntakeItemId, ItemKey, WorkflowId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, IntakeFlow, IntakeStage, IntakeWorkflow, WorkflowError};
pub use tenant::{TenantContext, TenantResolver};
