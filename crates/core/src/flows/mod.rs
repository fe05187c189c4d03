pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, IntakeFlow, WorkflowError};
pub use states::{IntakeStage, IntakeWorkflow, TransitionOutcome, WorkflowProgress};
