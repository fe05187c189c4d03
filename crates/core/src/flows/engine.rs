use std::collections::BTreeSet;

use chrono::Utc;
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::intake::WorkflowId;
use crate::flows::states::{IntakeStage, IntakeWorkflow, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_stage(&self) -> IntakeStage;

    /// Actions that must all be completed before the flow leaves `stage`.
    /// Empty for terminal stages.
    fn gating_actions(&self, stage: IntakeStage) -> &'static [&'static str];

    /// Suggested actions once the terminal stage is reached.
    fn terminal_actions(&self) -> &'static [&'static str];
}

#[derive(Clone, Debug, Default)]
pub struct IntakeFlow;

impl FlowDefinition for IntakeFlow {
    fn initial_stage(&self) -> IntakeStage {
        IntakeStage::RequirementsGathering
    }

    fn gating_actions(&self, stage: IntakeStage) -> &'static [&'static str] {
        match stage {
            IntakeStage::RequirementsGathering => &["collected_description", "collected_cost"],
            IntakeStage::ComplianceCheck => {
                &["compliance_reviewed", "acquisition_strategy_selected"]
            }
            IntakeStage::DocumentGeneration => &["documents_drafted"],
            IntakeStage::ReviewSubmit => &[],
        }
    }

    fn terminal_actions(&self) -> &'static [&'static str] {
        &["review_documents", "submit_package"]
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("a workflow needs a non-empty acquisition description")]
    MissingDescription,
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn start(
        &self,
        workflow_id: WorkflowId,
        description: &str,
    ) -> Result<IntakeWorkflow, WorkflowError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(WorkflowError::MissingDescription);
        }

        let now = Utc::now();
        Ok(IntakeWorkflow {
            workflow_id,
            description: description.to_string(),
            stage: self.flow.initial_stage(),
            completed_actions: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Stage is a pure function of the completed set: the first stage whose
    /// gating actions are not all done. A growing set can only move it forward.
    pub fn derive_stage(&self, completed: &BTreeSet<String>) -> IntakeStage {
        IntakeStage::ALL
            .into_iter()
            .skip(self.flow.initial_stage().ordinal())
            .find(|stage| {
                stage.is_terminal()
                    || !self
                        .flow
                        .gating_actions(*stage)
                        .iter()
                        .all(|action| completed.contains(*action))
            })
            .unwrap_or(IntakeStage::ReviewSubmit)
    }

    pub fn next_actions(&self, workflow: &IntakeWorkflow) -> Vec<String> {
        if workflow.stage.is_terminal() {
            return self.flow.terminal_actions().iter().map(|action| action.to_string()).collect();
        }

        self.flow
            .gating_actions(workflow.stage)
            .iter()
            .filter(|action| !workflow.completed_actions.contains(**action))
            .map(|action| action.to_string())
            .collect()
    }

    /// Folds newly reported actions into the workflow and recomputes the stage.
    ///
    /// Re-reporting an action is a no-op; there is no way to request a stage
    /// directly.
    pub fn advance<I, S>(&self, workflow: &mut IntakeWorkflow, completed: I) -> TransitionOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let from = workflow.stage;
        let mut newly_completed = Vec::new();

        for action in completed {
            let normalized = normalize_action(action.as_ref());
            if normalized.is_empty() {
                continue;
            }
            if workflow.completed_actions.insert(normalized.clone()) {
                newly_completed.push(normalized);
            }
        }

        let derived = self.derive_stage(&workflow.completed_actions);
        // The completed set never shrinks, but a record loaded from storage may
        // carry a stage written by an older flow definition.
        workflow.stage = derived.max(from);
        if !newly_completed.is_empty() || workflow.stage != from {
            workflow.updated_at = Utc::now();
        }

        TransitionOutcome {
            from,
            to: workflow.stage,
            newly_completed,
            next_actions: self.next_actions(workflow),
        }
    }

    pub fn advance_with_audit<I, S, K>(
        &self,
        workflow: &mut IntakeWorkflow,
        completed: I,
        sink: &K,
        audit: &AuditContext,
    ) -> TransitionOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        K: AuditSink + ?Sized,
    {
        let outcome = self.advance(workflow, completed);
        sink.emit(
            AuditEvent::from_context(
                audit,
                "workflow.advanced",
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("workflow_id", workflow.workflow_id.0.clone())
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("newly_completed", outcome.newly_completed.join(",")),
        );
        outcome
    }
}

impl Default for FlowEngine<IntakeFlow> {
    fn default() -> Self {
        Self::new(IntakeFlow)
    }
}

pub fn normalize_action(action: &str) -> String {
    action.trim().to_ascii_lowercase()
}
