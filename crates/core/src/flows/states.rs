use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intake::WorkflowId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStage {
    RequirementsGathering,
    ComplianceCheck,
    DocumentGeneration,
    ReviewSubmit,
}

impl IntakeStage {
    pub const ALL: [IntakeStage; 4] = [
        IntakeStage::RequirementsGathering,
        IntakeStage::ComplianceCheck,
        IntakeStage::DocumentGeneration,
        IntakeStage::ReviewSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementsGathering => "requirements_gathering",
            Self::ComplianceCheck => "compliance_check",
            Self::DocumentGeneration => "document_generation",
            Self::ReviewSubmit => "review_submit",
        }
    }

    /// Zero-based position in the stage ordering.
    pub fn ordinal(&self) -> usize {
        match self {
            Self::RequirementsGathering => 0,
            Self::ComplianceCheck => 1,
            Self::DocumentGeneration => 2,
            Self::ReviewSubmit => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReviewSubmit)
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == value.trim())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeWorkflow {
    pub workflow_id: WorkflowId,
    pub description: String,
    pub stage: IntakeStage,
    pub completed_actions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: IntakeStage,
    pub to: IntakeStage,
    pub newly_completed: Vec<String>,
    pub next_actions: Vec<String>,
}

impl TransitionOutcome {
    pub fn stage_changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub stage_index: usize,
    pub total_stages: usize,
    pub percent: u8,
}

impl WorkflowProgress {
    pub fn for_stage(stage: IntakeStage) -> Self {
        let total_stages = IntakeStage::ALL.len();
        let stage_index = stage.ordinal() + 1;
        let percent = (stage.ordinal() * 100 / (total_stages - 1)) as u8;
        Self { stage_index, total_stages, percent }
    }
}
