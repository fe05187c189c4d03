//! Key-value key conventions for intake records and workflows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantContext;

pub const INTAKE_KEY_PREFIX: &str = "INTAKE#";
pub const WORKFLOW_KEY_PREFIX: &str = "WORKFLOW#";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntakeItemId(pub String);

impl IntakeItemId {
    /// Server-side id generation; callers never choose item ids.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(format!("wf-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

pub fn intake_partition(tenant: &TenantContext) -> String {
    format!("{INTAKE_KEY_PREFIX}{}", tenant.tenant_id)
}

pub fn intake_key(tenant: &TenantContext, item_id: &IntakeItemId) -> ItemKey {
    ItemKey { pk: intake_partition(tenant), sk: format!("{INTAKE_KEY_PREFIX}{}", item_id.0) }
}

pub fn workflow_partition(tenant: &TenantContext) -> String {
    format!("{WORKFLOW_KEY_PREFIX}{}", tenant.tenant_id)
}

pub fn workflow_key(tenant: &TenantContext, workflow_id: &WorkflowId) -> ItemKey {
    ItemKey {
        pk: workflow_partition(tenant),
        sk: format!("{WORKFLOW_KEY_PREFIX}{}", workflow_id.0),
    }
}
