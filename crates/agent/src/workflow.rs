//! Persistence and projections around the intake flow engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use procura_core::domain::intake::workflow_key;
use procura_core::flows::WorkflowProgress;
use procura_core::{
    ApplicationError, AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink,
    ChecklistSummary, DomainError, FlowEngine, IntakeFlow, IntakeStage, IntakeWorkflow,
    TenantContext, WorkflowError, WorkflowId,
};
use procura_db::stores::{PARTITION_KEY, SORT_KEY};
use procura_db::{AttributeValue, Item, KeyValueStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::checklist::ChecklistTracker;
use crate::locks::ItemLocks;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum WorkflowServiceError {
    #[error("workflow `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored workflow is malformed: {0}")]
    Corrupt(String),
}

impl From<WorkflowServiceError> for ToolError {
    fn from(error: WorkflowServiceError) -> Self {
        match error {
            WorkflowServiceError::NotFound(_) => Self::NotFound(error.to_string()),
            WorkflowServiceError::Workflow(error) => Self::InvalidInput(error.to_string()),
            WorkflowServiceError::Store(error) => Self::Store(error),
            WorkflowServiceError::Corrupt(message) => Self::Internal(message),
        }
    }
}

impl From<WorkflowServiceError> for ApplicationError {
    fn from(error: WorkflowServiceError) -> Self {
        match error {
            WorkflowServiceError::NotFound(_) => Self::NotFound(error.to_string()),
            WorkflowServiceError::Workflow(error) => Self::Domain(DomainError::Workflow(error)),
            WorkflowServiceError::Store(error) => Self::Persistence(error.to_string()),
            WorkflowServiceError::Corrupt(message) => Self::Persistence(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub stage: IntakeStage,
    pub next_actions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowAdvance {
    pub workflow_id: String,
    pub previous_stage: IntakeStage,
    pub stage: IntakeStage,
    pub newly_completed: Vec<String>,
    pub next_actions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowStatus {
    pub workflow_id: String,
    pub description: String,
    pub stage: IntakeStage,
    pub progress: WorkflowProgress,
    pub completed_actions: Vec<String>,
    pub next_actions: Vec<String>,
    pub completed_documents: ChecklistSummary,
    pub ready_to_submit: bool,
}

pub struct WorkflowService {
    records: Arc<dyn KeyValueStore>,
    checklist: ChecklistTracker,
    engine: FlowEngine<IntakeFlow>,
    locks: ItemLocks,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    /// `locks` must be shared with every other writer of the same records.
    pub fn new(
        records: Arc<dyn KeyValueStore>,
        checklist: ChecklistTracker,
        locks: ItemLocks,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { records, checklist, engine: FlowEngine::default(), locks, audit }
    }

    pub async fn start(
        &self,
        tenant: &TenantContext,
        description: &str,
        audit: &AuditContext,
    ) -> Result<WorkflowSnapshot, WorkflowServiceError> {
        let workflow = self.engine.start(WorkflowId::generate(), description)?;
        self.records.put_item(encode_workflow(tenant, &workflow)).await?;

        info!(
            event_name = "workflow.started",
            correlation_id = %audit.correlation_id,
            tenant_id = %tenant.tenant_id,
            workflow_id = %workflow.workflow_id.0,
            "intake workflow started"
        );
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                "workflow.started",
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("workflow_id", workflow.workflow_id.0.clone()),
        );

        Ok(WorkflowSnapshot {
            workflow_id: workflow.workflow_id.0.clone(),
            stage: workflow.stage,
            next_actions: self.engine.next_actions(&workflow),
        })
    }

    pub async fn advance<I, S>(
        &self,
        tenant: &TenantContext,
        workflow_id: &str,
        completed_actions: I,
        audit: &AuditContext,
    ) -> Result<WorkflowAdvance, WorkflowServiceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = WorkflowId(workflow_id.trim().to_string());
        let key = workflow_key(tenant, &id);
        let _guard = self.locks.acquire(&key.pk, &key.sk).await;

        let mut workflow = self.load(tenant, workflow_id).await?;
        let outcome = self.engine.advance_with_audit(
            &mut workflow,
            completed_actions,
            self.audit.as_ref(),
            audit,
        );

        if !outcome.newly_completed.is_empty() || outcome.stage_changed() {
            self.records.put_item(encode_workflow(tenant, &workflow)).await?;
        }

        info!(
            event_name = "workflow.advanced",
            correlation_id = %audit.correlation_id,
            tenant_id = %tenant.tenant_id,
            workflow_id = %workflow.workflow_id.0,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            newly_completed = outcome.newly_completed.len(),
            "intake workflow advanced"
        );

        Ok(WorkflowAdvance {
            workflow_id: workflow.workflow_id.0,
            previous_stage: outcome.from,
            stage: outcome.to,
            newly_completed: outcome.newly_completed,
            next_actions: outcome.next_actions,
        })
    }

    /// Document counts come from the checklist projection, never from the
    /// workflow record.
    pub async fn status(
        &self,
        tenant: &TenantContext,
        workflow_id: &str,
    ) -> Result<WorkflowStatus, WorkflowServiceError> {
        let workflow = self.load(tenant, workflow_id).await?;
        let checklist = self.checklist.checklist(tenant).await?;
        let ready_to_submit =
            workflow.stage.is_terminal() && checklist.summary.all_required_complete();

        Ok(WorkflowStatus {
            workflow_id: workflow.workflow_id.0.clone(),
            description: workflow.description.clone(),
            stage: workflow.stage,
            progress: WorkflowProgress::for_stage(workflow.stage),
            completed_actions: workflow.completed_actions.iter().cloned().collect(),
            next_actions: self.engine.next_actions(&workflow),
            completed_documents: checklist.summary,
            ready_to_submit,
        })
    }

    async fn load(
        &self,
        tenant: &TenantContext,
        workflow_id: &str,
    ) -> Result<IntakeWorkflow, WorkflowServiceError> {
        let id = WorkflowId(workflow_id.trim().to_string());
        if id.0.is_empty() {
            return Err(WorkflowServiceError::NotFound(String::new()));
        }

        let key = workflow_key(tenant, &id);
        let item = self
            .records
            .get_item(&key.pk, &key.sk)
            .await?
            .ok_or_else(|| WorkflowServiceError::NotFound(id.0.clone()))?;
        decode_workflow(&item)
    }
}

fn encode_workflow(tenant: &TenantContext, workflow: &IntakeWorkflow) -> Item {
    let key = workflow_key(tenant, &workflow.workflow_id);
    let mut item = Item::new();
    item.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.pk));
    item.insert(SORT_KEY.to_string(), AttributeValue::S(key.sk));
    item.insert("workflow_id".to_string(), AttributeValue::string(workflow.workflow_id.0.as_str()));
    item.insert("description".to_string(), AttributeValue::string(workflow.description.as_str()));
    item.insert("stage".to_string(), AttributeValue::string(workflow.stage.as_str()));
    item.insert(
        "completed_actions".to_string(),
        AttributeValue::L(
            workflow
                .completed_actions
                .iter()
                .map(|action| AttributeValue::string(action.as_str()))
                .collect(),
        ),
    );
    item.insert("created_at".to_string(), AttributeValue::Timestamp(workflow.created_at));
    item.insert("updated_at".to_string(), AttributeValue::Timestamp(workflow.updated_at));
    item
}

fn decode_workflow(item: &Item) -> Result<IntakeWorkflow, WorkflowServiceError> {
    let text = |field: &str| {
        item.get(field)
            .and_then(AttributeValue::as_str)
            .ok_or_else(|| WorkflowServiceError::Corrupt(format!("missing `{field}`")))
    };
    let timestamp = |field: &str| -> Result<DateTime<Utc>, WorkflowServiceError> {
        item.get(field)
            .and_then(AttributeValue::as_timestamp)
            .ok_or_else(|| WorkflowServiceError::Corrupt(format!("missing `{field}`")))
    };

    let workflow_id = text("workflow_id")?;
    let stage_raw = text("stage")?;
    let stage = IntakeStage::parse(stage_raw)
        .ok_or_else(|| WorkflowServiceError::Corrupt(format!("unknown stage `{stage_raw}`")))?;
    let completed_actions: BTreeSet<String> = item
        .get("completed_actions")
        .and_then(AttributeValue::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(AttributeValue::as_str)
        .map(str::to_string)
        .collect();

    Ok(IntakeWorkflow {
        workflow_id: WorkflowId(workflow_id.to_string()),
        description: text("description")?.to_string(),
        stage,
        completed_actions,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_core::audit::InMemoryAuditSink;
    use procura_core::{AuditContext, IntakeStage, TenantContext};
    use procura_db::{
        InMemoryKeyValueStore, InMemoryObjectStore, KeyValueStore, ObjectStore, PutMode,
    };

    use super::{WorkflowService, WorkflowServiceError};
    use crate::checklist::ChecklistTracker;
    use crate::locks::tests::InterleavingStore;
    use crate::locks::ItemLocks;

    struct Fixture {
        service: WorkflowService,
        objects: Arc<InMemoryObjectStore>,
        sink: InMemoryAuditSink,
        tenant: TenantContext,
        audit: AuditContext,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryKeyValueStore::default()))
    }

    fn fixture_with(records: Arc<dyn KeyValueStore>) -> Fixture {
        let objects = Arc::new(InMemoryObjectStore::default());
        let sink = InMemoryAuditSink::default();
        let service = WorkflowService::new(
            records,
            ChecklistTracker::new(objects.clone()),
            ItemLocks::default(),
            Arc::new(sink.clone()),
        );
        let tenant = TenantContext::new("demo-tenant", "ws-7");
        let audit = AuditContext::new("demo-tenant", Some("ws-7".to_string()), "req-1", "ws-7");
        Fixture { service, objects, sink, tenant, audit }
    }

    #[tokio::test]
    async fn centrifuge_scenario_moves_through_compliance() {
        let fx = fixture();

        let started = fx
            .service
            .start(&fx.tenant, "need a lab centrifuge", &fx.audit)
            .await
            .expect("start");
        assert_eq!(started.stage, IntakeStage::RequirementsGathering);
        assert_eq!(started.next_actions, vec!["collected_description", "collected_cost"]);

        let advanced = fx
            .service
            .advance(
                &fx.tenant,
                &started.workflow_id,
                ["collected_description", "collected_cost"],
                &fx.audit,
            )
            .await
            .expect("advance");
        assert_eq!(advanced.stage, IntakeStage::ComplianceCheck);

        let status = fx.service.status(&fx.tenant, &started.workflow_id).await.expect("status");
        assert_eq!(status.completed_documents.total, 10);
        assert_eq!(status.completed_documents.complete, 0);
        assert!(!status.ready_to_submit);

        fx.objects
            .put(
                "demo-tenant/ws-7/documents/sow_20260101T000000.md",
                "# SOW".to_string(),
                "text/markdown",
                PutMode::CreateOnly,
            )
            .await
            .expect("artifact");
        let status = fx.service.status(&fx.tenant, &started.workflow_id).await.expect("status");
        assert_eq!(status.completed_documents.complete, 1);

        let event_types: Vec<_> =
            fx.sink.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(event_types, vec!["workflow.started", "workflow.advanced"]);
    }

    #[tokio::test]
    async fn advance_is_idempotent_and_never_regresses() {
        let fx = fixture();
        let started = fx.service.start(&fx.tenant, "laptops", &fx.audit).await.expect("start");
        let id = started.workflow_id.as_str();
        let actions = ["collected_description", "collected_cost", "compliance_reviewed"];

        let first = fx.service.advance(&fx.tenant, id, actions, &fx.audit).await.expect("first");
        let second = fx.service.advance(&fx.tenant, id, actions, &fx.audit).await.expect("second");
        assert_eq!(first.stage, second.stage);
        assert!(second.newly_completed.is_empty());

        let empty: [&str; 0] = [];
        let third = fx.service.advance(&fx.tenant, id, empty, &fx.audit).await.expect("third");
        assert_eq!(third.stage, IntakeStage::ComplianceCheck);
    }

    #[tokio::test]
    async fn concurrent_advances_keep_every_completed_action() {
        let fx = fixture_with(Arc::new(InterleavingStore::default()));
        let started =
            fx.service.start(&fx.tenant, "need a lab centrifuge", &fx.audit).await.expect("start");
        let id = started.workflow_id.as_str();

        let (gathered, reviewed) = tokio::join!(
            fx.service.advance(
                &fx.tenant,
                id,
                ["collected_description", "collected_cost"],
                &fx.audit
            ),
            fx.service.advance(&fx.tenant, id, ["compliance_reviewed"], &fx.audit),
        );
        gathered.expect("gathered");
        reviewed.expect("reviewed");

        let status = fx.service.status(&fx.tenant, id).await.expect("status");
        assert_eq!(status.stage, IntakeStage::ComplianceCheck);
        assert_eq!(
            status.completed_actions,
            vec!["collected_cost", "collected_description", "compliance_reviewed"]
        );
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found_and_not_created() {
        let fx = fixture();

        let advance =
            fx.service.advance(&fx.tenant, "wf-missing", ["collected_cost"], &fx.audit).await;
        assert!(matches!(advance, Err(WorkflowServiceError::NotFound(id)) if id == "wf-missing"));

        let status = fx.service.status(&fx.tenant, "wf-missing").await;
        assert!(matches!(status, Err(WorkflowServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn workflows_are_scoped_to_their_tenant() {
        let fx = fixture();
        let started = fx.service.start(&fx.tenant, "microscopes", &fx.audit).await.expect("start");

        let other = TenantContext::new("other-agency", "ws-7");
        let status = fx.service.status(&other, &started.workflow_id).await;
        assert!(matches!(status, Err(WorkflowServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn blank_description_is_rejected() {
        let fx = fixture();
        let result = fx.service.start(&fx.tenant, "   ", &fx.audit).await;
        assert!(matches!(result, Err(WorkflowServiceError::Workflow(_))));
    }
}
