//! Agent runtime for the acquisition intake assistant.
//!
//! The crate wires a language model to a fixed set of tenant-scoped tools:
//!
//! 1. **Tools** (`tools`, `handlers`) - named operations over the object,
//!    key-value and log stores, registered once in an immutable registry.
//! 2. **Dispatch** (`dispatcher`) - resolves the tenant for a session, invokes
//!    exactly one handler per call and folds every outcome, including panics,
//!    into a [`dispatcher::ToolResult`].
//! 3. **Projections** (`checklist`, `workflow`) - the document checklist is
//!    computed from stored artifacts; the intake workflow advances only from
//!    reported actions.
//! 4. **Loop** (`runtime`) - alternates model turns and tool rounds until the
//!    model finishes or a bound is hit.
//!
//! The model never decides what is complete. Checklist status and workflow
//! stage are deterministic functions of stored state.

pub mod anthropic;
pub mod checklist;
pub mod dispatcher;
pub mod handlers;
pub mod llm;
pub mod locks;
pub mod render;
pub mod runtime;
pub mod tools;
pub mod workflow;

pub use anthropic::MessagesApiClient;
pub use checklist::ChecklistTracker;
pub use dispatcher::{ToolCall, ToolDispatcher, ToolErrorKind, ToolResult};
pub use llm::{
    ContentBlock, LlmClient, Message, ModelRequest, ModelResponse, Role, StopReason, ToolSpec,
    Usage,
};
pub use locks::ItemLocks;
pub use render::{DocumentRenderer, RenderError};
pub use runtime::{
    AgentRuntime, NoopObserver, RunOutcome, RuntimeConfig, RuntimeError, Termination,
    TurnObserver,
};
pub use tools::{Tool, ToolError, ToolRegistry};
pub use workflow::{WorkflowService, WorkflowServiceError};
