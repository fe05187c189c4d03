//! HTTP surface over the agent runtime, workflow service and checklist.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use procura_agent::{Message, NoopObserver, RunOutcome};
use procura_core::audit::AuditContext;
use procura_core::domain::checklist::DocumentChecklist;
use procura_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::Services;

#[derive(Clone)]
pub struct ApiState {
    services: Services,
    shutdown: CancellationToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub completed_actions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChecklistQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn router(services: Services, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/workflow", post(workflow))
        .route("/api/checklist", get(checklist))
        .with_state(ApiState { services, shutdown })
}

pub async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<RunOutcome>, ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    if request.messages.is_empty() {
        return Err(failure(InterfaceError::BadRequest {
            message: "messages must not be empty".to_string(),
            correlation_id,
        }));
    }

    let session_id = request.session_id.unwrap_or_default();
    let cancel = state.shutdown.child_token();
    let outcome = state
        .services
        .runtime
        .run(request.messages, &session_id, &cancel, &NoopObserver)
        .await
        .map_err(|error| {
            let error = ApplicationError::Integration(error.to_string());
            failure(error.into_interface(&correlation_id))
        })?;

    info!(
        event_name = "api.chat.completed",
        correlation_id = %correlation_id,
        session_id = %session_id,
        iterations = outcome.iterations,
        termination = ?outcome.termination,
        "chat run completed"
    );
    Ok(Json(outcome))
}

pub async fn workflow(
    State(state): State<ApiState>,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<Value>, ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let tenant = state.services.resolver.resolve(request.session_id.as_deref());
    let audit = AuditContext::new(
        tenant.tenant_id.clone(),
        request.session_id.clone(),
        correlation_id.clone(),
        tenant.user_id.clone(),
    );
    let workflows = &state.services.workflows;

    let result = match request.action.trim() {
        "start" => {
            let description = request.description.as_deref().unwrap_or_default();
            workflows.start(&tenant, description, &audit).await.map(|started| to_value(&started))
        }
        "advance" => {
            let workflow_id =
                required(request.workflow_id.as_deref(), "workflow_id", &correlation_id)?;
            workflows
                .advance(&tenant, workflow_id, &request.completed_actions, &audit)
                .await
                .map(|advanced| to_value(&advanced))
        }
        "status" => {
            let workflow_id =
                required(request.workflow_id.as_deref(), "workflow_id", &correlation_id)?;
            workflows.status(&tenant, workflow_id).await.map(|status| to_value(&status))
        }
        other => {
            return Err(failure(InterfaceError::BadRequest {
                message: format!(
                    "unknown workflow action `{other}` (expected start|advance|status)"
                ),
                correlation_id,
            }));
        }
    };

    result.map(Json).map_err(|error| {
        warn!(
            event_name = "api.workflow.failed",
            correlation_id = %correlation_id,
            action = %request.action,
            error = %error,
            "workflow request failed"
        );
        failure(ApplicationError::from(error).into_interface(&correlation_id))
    })
}

pub async fn checklist(
    State(state): State<ApiState>,
    Query(query): Query<ChecklistQuery>,
) -> Result<Json<DocumentChecklist>, ApiFailure> {
    let tenant = state.services.resolver.resolve(query.session_id.as_deref());
    state.services.checklist.checklist(&tenant).await.map(Json).map_err(|error| {
        let correlation_id = Uuid::new_v4().to_string();
        failure(ApplicationError::Persistence(error.to_string()).into_interface(correlation_id))
    })
}

fn required<'a>(
    value: Option<&'a str>,
    field: &str,
    correlation_id: &str,
) -> Result<&'a str, ApiFailure> {
    value.map(str::trim).filter(|value| !value.is_empty()).ok_or_else(|| {
        failure(InterfaceError::BadRequest {
            message: format!("`{field}` is required"),
            correlation_id: correlation_id.to_string(),
        })
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn failure(error: InterfaceError) -> ApiFailure {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ApiError {
        error: error.user_message().to_string(),
        detail: error.to_string(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        Json,
    };
    use procura_agent::{Message, Termination};
    use tokio_util::sync::CancellationToken;

    use super::{checklist, chat, workflow, ApiState, ChatRequest, ChecklistQuery, WorkflowRequest};
    use crate::bootstrap::tests::test_application;

    async fn state() -> ApiState {
        let app = test_application().await;
        ApiState { services: app.services, shutdown: CancellationToken::new() }
    }

    fn workflow_request(action: &str) -> WorkflowRequest {
        WorkflowRequest {
            session_id: Some("ws-api-1".to_string()),
            action: action.to_string(),
            description: None,
            workflow_id: None,
            completed_actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn chat_returns_the_run_outcome() {
        let Json(outcome) = chat(
            State(state().await),
            Json(ChatRequest {
                session_id: Some("ws-api-1".to_string()),
                messages: vec![Message::user_text("I need a lab centrifuge")],
            }),
        )
        .await
        .expect("chat should succeed");

        assert_eq!(outcome.text, "echo: I need a lab centrifuge");
        assert_eq!(outcome.termination, Termination::EndTurn);
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn chat_rejects_empty_conversations() {
        let result = chat(
            State(state().await),
            Json(ChatRequest { session_id: None, messages: Vec::new() }),
        )
        .await;

        let (status, Json(body)) = result.expect_err("empty conversation must be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.detail.contains("messages"));
    }

    #[tokio::test]
    async fn workflow_round_trip_through_the_api() {
        let state = state().await;

        let mut start = workflow_request("start");
        start.description = Some("need a lab centrifuge".to_string());
        let Json(started) = workflow(State(state.clone()), Json(start)).await.expect("start");
        assert_eq!(started["stage"], "requirements_gathering");
        let workflow_id = started["workflow_id"].as_str().expect("workflow id").to_string();

        let mut advance = workflow_request("advance");
        advance.workflow_id = Some(workflow_id.clone());
        advance.completed_actions =
            vec!["collected_description".to_string(), "collected_cost".to_string()];
        let Json(advanced) = workflow(State(state.clone()), Json(advance)).await.expect("advance");
        assert_eq!(advanced["stage"], "compliance_check");

        let mut status = workflow_request("status");
        status.workflow_id = Some(workflow_id);
        let Json(status) = workflow(State(state.clone()), Json(status)).await.expect("status");
        assert_eq!(status["completed_documents"]["total"], 10);
        assert_eq!(status["ready_to_submit"], false);
    }

    #[tokio::test]
    async fn workflow_errors_map_to_status_codes() {
        let state = state().await;

        let mut missing = workflow_request("status");
        missing.workflow_id = Some("wf-unknown".to_string());
        let (status, _) = workflow(State(state.clone()), Json(missing)).await.expect_err("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = workflow(State(state.clone()), Json(workflow_request("advance")))
            .await
            .expect_err("workflow_id required");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = workflow(State(state.clone()), Json(workflow_request("start")))
            .await
            .expect_err("blank description");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = workflow(State(state), Json(workflow_request("archive")))
            .await
            .expect_err("unknown action");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn checklist_starts_with_everything_pending() {
        let Json(list) = checklist(
            State(state().await),
            Query(ChecklistQuery { session_id: Some("ws-api-1".to_string()) }),
        )
        .await
        .expect("checklist");

        assert_eq!(list.items.len(), 10);
        assert_eq!(list.summary.pending, 10);
        assert_eq!(list.summary.required_total, 5);
    }
}
