//! Bounded model/tool loop.
//!
//! One run alternates model turns and tool rounds. It stops when the model
//! ends its turn, when the iteration ceiling is reached, or when the caller
//! cancels or the optional deadline passes. Only a failed model call is an
//! error; every other stop returns whatever text has been produced.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::{ToolCall, ToolDispatcher, ToolResult};
use crate::llm::{
    ContentBlock, LlmClient, Message, ModelRequest, ModelResponse, Role, StopReason, ToolUse,
    Usage,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const CEILING_NOTICE: &str =
    "I ran out of steps before finishing. Here is where things stand; ask me to continue.";
const CANCELLED_NOTICE: &str = "The request was cancelled before a response was completed.";
const DEADLINE_NOTICE: &str = "The request took too long and was stopped before completion.";

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_iterations: usize,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    /// Wall-clock bound for a whole run.
    pub max_run: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            max_run: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    EndTurn,
    MaxTokens,
    IterationCeilingReached,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunOutcome {
    pub text: String,
    pub usage: Usage,
    pub tools_used: Vec<String>,
    pub iterations: usize,
    pub termination: Termination,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("model call failed on iteration {iteration}: {source}")]
    Model {
        iteration: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Caller-supplied callbacks for streaming progress. All methods default to
/// no-ops.
pub trait TurnObserver: Send + Sync {
    fn on_text(&self, _text: &str) {}

    fn on_tool_use(&self, _tool_use_id: &str, _tool_name: &str) {}

    fn on_tool_result(&self, _tool_use_id: &str, _result: &ToolResult) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        config: RuntimeConfig,
    ) -> Self {
        Self { llm, dispatcher, config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub async fn run(
        &self,
        messages: Vec<Message>,
        session_id: &str,
        cancel: &CancellationToken,
        observer: &dyn TurnObserver,
    ) -> Result<RunOutcome, RuntimeError> {
        let correlation_id = Uuid::new_v4().to_string();
        let deadline = self.config.max_run.map(|limit| Instant::now() + limit);
        let tools = self.dispatcher.registry().specs();

        let mut conversation = messages;
        let mut text = String::new();
        let mut usage = Usage::default();
        let mut tools_used = Vec::new();
        let mut iterations = 0;

        info!(
            event_name = "agent.run.started",
            correlation_id = %correlation_id,
            session_id,
            message_count = conversation.len(),
            max_iterations = self.config.max_iterations,
            "agent run started"
        );

        let termination = loop {
            if iterations >= self.config.max_iterations {
                warn!(
                    event_name = "agent.run.ceiling_reached",
                    correlation_id = %correlation_id,
                    session_id,
                    iterations,
                    "iteration ceiling reached"
                );
                break Termination::IterationCeilingReached;
            }
            iterations += 1;

            let request = ModelRequest {
                system: self.config.system_prompt.clone(),
                messages: conversation.clone(),
                tools: tools.clone(),
                max_tokens: self.config.max_tokens,
            };
            let completion = interruptible(self.llm.complete(&request), cancel, deadline).await;
            let response = match completion {
                Ok(Ok(response)) => response,
                Ok(Err(source)) => {
                    return Err(RuntimeError::Model { iteration: iterations, source });
                }
                Err(interrupt) => break interrupt.into(),
            };
            usage.accumulate(response.usage);

            let turn_text = response.text();
            if !turn_text.is_empty() {
                observer.on_text(&turn_text);
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&turn_text);
            }

            let tool_uses = response.tool_uses();
            match response.stop_reason {
                StopReason::ToolUse if !tool_uses.is_empty() => {}
                StopReason::MaxTokens => break Termination::MaxTokens,
                _ => break Termination::EndTurn,
            }

            tools_used.extend(tool_uses.iter().map(|tool_use| tool_use.name.clone()));
            let round = self.execute_tools(&tool_uses, session_id, &correlation_id, observer);
            let results = match interruptible(round, cancel, deadline).await {
                Ok(results) => results,
                Err(interrupt) => break interrupt.into(),
            };

            conversation.push(assistant_turn(response));
            conversation.push(Message { role: Role::User, content: results });
        };

        if text.trim().is_empty() {
            if let Some(notice) = notice_for(termination) {
                text = notice.to_string();
            }
        }

        info!(
            event_name = "agent.run.completed",
            correlation_id = %correlation_id,
            session_id,
            iterations,
            termination = ?termination,
            tools_used = tools_used.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "agent run completed"
        );

        Ok(RunOutcome { text, usage, tools_used, iterations, termination })
    }

    /// Dispatches every call of one turn concurrently and returns the result
    /// blocks in request order.
    async fn execute_tools(
        &self,
        tool_uses: &[ToolUse],
        session_id: &str,
        correlation_id: &str,
        observer: &dyn TurnObserver,
    ) -> Vec<ContentBlock> {
        let calls = tool_uses.iter().map(|tool_use| {
            observer.on_tool_use(&tool_use.id, &tool_use.name);
            let call = ToolCall::new(tool_use.name.as_str(), tool_use.input.clone(), session_id);
            async move {
                let result = self.dispatcher.dispatch_with_correlation(&call, correlation_id).await;
                (tool_use, result)
            }
        });

        join_all(calls)
            .await
            .into_iter()
            .map(|(tool_use, result)| {
                observer.on_tool_result(&tool_use.id, &result);
                ContentBlock::ToolResult {
                    tool_use_id: tool_use.id.clone(),
                    content: result.to_wire_string(),
                    is_error: !result.ok,
                }
            })
            .collect()
    }
}

impl From<Interrupt> for Termination {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Self::Cancelled,
            Interrupt::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

async fn interruptible<F, T>(
    work: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<T, Interrupt>
where
    F: std::future::Future<Output = T>,
{
    if cancel.is_cancelled() {
        return Err(Interrupt::Cancelled);
    }

    let expiry = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = expiry => Err(Interrupt::DeadlineExceeded),
        output = work => Ok(output),
    }
}

fn assistant_turn(response: ModelResponse) -> Message {
    Message::assistant(response.content)
}

fn notice_for(termination: Termination) -> Option<&'static str> {
    match termination {
        Termination::IterationCeilingReached => Some(CEILING_NOTICE),
        Termination::Cancelled => Some(CANCELLED_NOTICE),
        Termination::DeadlineExceeded => Some(DEADLINE_NOTICE),
        Termination::EndTurn | Termination::MaxTokens => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use procura_core::audit::NoopAuditSink;
    use procura_core::{TenantContext, TenantResolver};
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::{
        AgentRuntime, NoopObserver, RuntimeConfig, RuntimeError, Termination, TurnObserver,
    };
    use crate::dispatcher::{ToolDispatcher, ToolResult};
    use crate::llm::{
        ContentBlock, LlmClient, Message, ModelRequest, ModelResponse, StopReason, Usage,
    };
    use crate::tools::{Tool, ToolError, ToolRegistry};

    struct Scripted {
        responses: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<ModelResponse>) -> Self {
            Self { responses: Mutex::new(responses.into()), requests: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
            self.requests.lock().expect("lock").push(request.clone());
            let next = self.responses.lock().expect("lock").pop_front();
            next.ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    struct Slow;

    #[async_trait]
    impl LlmClient for Slow {
        async fn complete(&self, _request: &ModelRequest) -> Result<ModelResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(anyhow!("unreachable"))
        }
    }

    struct Sleeper {
        delay_ms: u64,
        name: &'static str,
    }

    #[async_trait]
    impl Tool for Sleeper {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "Sleeps then echoes"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(
            &self,
            input: Value,
            _: &TenantContext,
            _: &str,
        ) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(json!({"echo": input, "tool": self.name}))
        }
    }

    fn tool_use(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({"id": id}),
        }
    }

    fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> ModelResponse {
        ModelResponse { content, stop_reason, usage: Usage { input_tokens: 10, output_tokens: 5 } }
    }

    fn runtime(llm: Arc<dyn LlmClient>, config: RuntimeConfig) -> AgentRuntime {
        let registry = ToolRegistry::default()
            .with(Sleeper { delay_ms: 30, name: "slow_tool" })
            .with(Sleeper { delay_ms: 1, name: "fast_tool" });
        let dispatcher = ToolDispatcher::new(
            Arc::new(registry),
            TenantResolver::default(),
            Arc::new(NoopAuditSink),
        );
        AgentRuntime::new(llm, Arc::new(dispatcher), config)
    }

    #[derive(Default)]
    struct Counting {
        tool_results: AtomicUsize,
    }

    impl TurnObserver for Counting {
        fn on_tool_result(&self, _tool_use_id: &str, _result: &ToolResult) {
            self.tool_results.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn tool_results_keep_request_order_and_loop_ends_on_end_turn() {
        let llm = Arc::new(Scripted::new(vec![
            response(
                vec![
                    ContentBlock::Text { text: "Checking.".to_string() },
                    tool_use("a", "slow_tool"),
                    tool_use("b", "fast_tool"),
                ],
                StopReason::ToolUse,
            ),
            response(
                vec![ContentBlock::Text { text: "All done.".to_string() }],
                StopReason::EndTurn,
            ),
        ]));
        let runtime = runtime(llm.clone(), RuntimeConfig::default());
        let observer = Counting::default();

        let outcome = runtime
            .run(vec![Message::user_text("hi")], "ws-1", &CancellationToken::new(), &observer)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::EndTurn);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tools_used, vec!["slow_tool", "fast_tool"]);
        assert_eq!(outcome.text, "Checking.\n\nAll done.");
        assert_eq!(outcome.usage.input_tokens, 20);
        assert_eq!(observer.tool_results.load(Ordering::SeqCst), 2);

        let requests = llm.requests.lock().expect("lock");
        let follow_up = requests[1].messages.last().expect("tool results message");
        let ids: Vec<_> = follow_up
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(requests[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tools_are_folded_back_and_the_loop_continues() {
        let llm = Arc::new(Scripted::new(vec![
            response(vec![tool_use("x", "no_such_tool")], StopReason::ToolUse),
            response(
                vec![ContentBlock::Text { text: "Recovered.".to_string() }],
                StopReason::EndTurn,
            ),
        ]));
        let runtime = runtime(llm.clone(), RuntimeConfig::default());

        let outcome = runtime
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.text, "Recovered.");
        let requests = llm.requests.lock().expect("lock");
        match requests[1].messages.last().and_then(|message| message.content.first()) {
            Some(ContentBlock::ToolResult { content, is_error, .. }) => {
                assert!(is_error);
                let wire: Value = serde_json::from_str(content).expect("json");
                assert_eq!(wire["tool"], "no_such_tool");
            }
            other => panic!("expected a tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_use_without_blocks_ends_the_turn() {
        let llm = Arc::new(Scripted::new(vec![response(
            vec![ContentBlock::Text { text: "Nothing to run.".to_string() }],
            StopReason::ToolUse,
        )]));
        let outcome = runtime(llm, RuntimeConfig::default())
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::EndTurn);
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn max_tokens_stops_with_partial_text() {
        let llm = Arc::new(Scripted::new(vec![response(
            vec![ContentBlock::Text { text: "Partial".to_string() }],
            StopReason::MaxTokens,
        )]));
        let outcome = runtime(llm, RuntimeConfig::default())
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::MaxTokens);
        assert_eq!(outcome.text, "Partial");
    }

    #[tokio::test]
    async fn model_failure_is_fatal() {
        let llm = Arc::new(Scripted::new(Vec::new()));
        let result = runtime(llm, RuntimeConfig::default())
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await;

        assert!(matches!(result, Err(RuntimeError::Model { iteration: 1, .. })));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_calling_the_model() {
        let llm = Arc::new(Scripted::new(Vec::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runtime(llm.clone(), RuntimeConfig::default())
            .run(vec![Message::user_text("hi")], "s", &cancel, &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert!(!outcome.text.is_empty());
        assert!(llm.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn deadline_bounds_a_hanging_model_call() {
        let config =
            RuntimeConfig { max_run: Some(Duration::from_millis(50)), ..RuntimeConfig::default() };
        let outcome = runtime(Arc::new(Slow), config)
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::DeadlineExceeded);
        assert!(!outcome.text.is_empty());
    }

    #[tokio::test]
    async fn deadline_during_a_tool_round_still_reports_the_dispatched_tools() {
        let llm = Arc::new(Scripted::new(vec![response(
            vec![tool_use("a", "slow_tool"), tool_use("b", "fast_tool")],
            StopReason::ToolUse,
        )]));
        let config =
            RuntimeConfig { max_run: Some(Duration::from_millis(10)), ..RuntimeConfig::default() };

        let outcome = runtime(llm, config)
            .run(vec![Message::user_text("hi")], "s", &CancellationToken::new(), &NoopObserver)
            .await
            .expect("run");

        assert_eq!(outcome.termination, Termination::DeadlineExceeded);
        assert_eq!(outcome.tools_used, vec!["slow_tool", "fast_tool"]);
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn cancel_during_a_tool_round_still_reports_the_dispatched_tools() {
        let llm = Arc::new(Scripted::new(vec![response(
            vec![tool_use("a", "slow_tool")],
            StopReason::ToolUse,
        )]));
        let runtime = runtime(llm, RuntimeConfig::default());
        let cancel = CancellationToken::new();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let run = runtime.run(vec![Message::user_text("hi")], "s", &cancel, &NoopObserver);
        let (outcome, ()) = tokio::join!(run, stop);
        let outcome = outcome.expect("run");

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.tools_used, vec!["slow_tool"]);
    }
}
