use std::sync::Arc;
use std::time::Duration;

use procura_agent::handlers::{build_registry, ToolDependencies};
use procura_agent::{
    AgentRuntime, ChecklistTracker, DocumentRenderer, ItemLocks, LlmClient, MessagesApiClient,
    RenderError, RuntimeConfig, ToolDispatcher, WorkflowService,
};
use procura_core::audit::AuditSink;
use procura_core::config::{AppConfig, ConfigError};
use procura_core::TenantResolver;
use procura_db::{
    connect_with_settings, migrations, DbPool, SqlKeyValueStore, SqlLogStore, SqlObjectStore,
};
use thiserror::Error;
use tracing::info;

use crate::audit_log::TracingAuditSink;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an acquisition intake assistant for a federal \
contracting office. Gather the requirement, its estimated cost and period of performance, \
then use the intake_workflow tool to record progress and create_document to draft the \
required documents. Use document_checklist to report what is still missing; never claim a \
document is complete unless the checklist says so.";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: Services,
}

/// Everything the HTTP surface needs, cheap to clone into axum state.
#[derive(Clone)]
pub struct Services {
    pub runtime: Arc<AgentRuntime>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub workflows: Arc<WorkflowService>,
    pub checklist: ChecklistTracker,
    pub resolver: TenantResolver,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document templates failed to load: {0}")]
    Templates(#[from] RenderError),
    #[error("llm client could not be built: {0}")]
    LlmClient(#[source] anyhow::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let llm = MessagesApiClient::from_config(&config.llm).map_err(BootstrapError::LlmClient)?;
    bootstrap_with_llm(config, Arc::new(llm)).await
}

pub async fn bootstrap_with_llm(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let services = assemble(&config, db_pool.clone(), llm)?;
    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tools = %services.dispatcher.registry().names().join(","),
        max_iterations = config.agent.max_iterations,
        "tool registry built"
    );

    Ok(Application { config, db_pool, services })
}

fn assemble(
    config: &AppConfig,
    db_pool: DbPool,
    llm: Arc<dyn LlmClient>,
) -> Result<Services, BootstrapError> {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let deps = ToolDependencies {
        objects: Arc::new(SqlObjectStore::new(db_pool.clone())),
        records: Arc::new(SqlKeyValueStore::new(db_pool.clone())),
        logs: Arc::new(SqlLogStore::new(db_pool)),
        renderer: Arc::new(DocumentRenderer::new()?),
        audit: audit.clone(),
        locks: ItemLocks::default(),
    };

    let resolver = TenantResolver::new(
        config.tenancy.default_tenant.clone(),
        config.tenancy.default_user.clone(),
        config.tenancy.websocket_session_prefix.clone(),
    );
    let dispatcher =
        Arc::new(ToolDispatcher::new(Arc::new(build_registry(&deps)), resolver.clone(), audit));
    let runtime = Arc::new(AgentRuntime::new(llm, dispatcher.clone(), runtime_config(config)));

    Ok(Services {
        runtime,
        dispatcher,
        workflows: deps.workflows(),
        checklist: deps.checklist(),
        resolver,
    })
}

fn runtime_config(config: &AppConfig) -> RuntimeConfig {
    RuntimeConfig {
        max_iterations: config.agent.max_iterations,
        max_tokens: config.llm.max_tokens,
        system_prompt: Some(
            config
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        ),
        max_run: (config.agent.max_run_secs > 0)
            .then(|| Duration::from_secs(config.agent.max_run_secs)),
    }
}
