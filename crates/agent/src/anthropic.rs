//! HTTP client for a Messages-API compatible model endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use procura_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{
    ContentBlock, LlmClient, Message, ModelRequest, ModelResponse, StopReason, ToolSpec, Usage,
};

const MESSAGES_PATH: &str = "/v1/messages";
const ERROR_BODY_LIMIT: usize = 512;

pub struct MessagesApiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    anthropic_version: String,
}

impl MessagesApiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build model HTTP client")?;

        Ok(Self {
            http,
            endpoint: format!("{}{MESSAGES_PATH}", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            anthropic_version: config.anthropic_version.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolSpec],
}

fn no_tools(tools: &&[ToolSpec]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Usage,
}

impl From<WireResponse> for ModelResponse {
    fn from(wire: WireResponse) -> Self {
        let stop_reason = match wire.stop_reason {
            Some(StopReason::StopSequence) | None => StopReason::EndTurn,
            Some(reason) => reason,
        };
        Self { content: wire.content, stop_reason, usage: wire.usage }
    }
}

#[async_trait]
impl LlmClient for MessagesApiClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = WireRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: &request.messages,
            tools: &request.tools,
        };

        debug!(
            event_name = "agent.model.request",
            model = %self.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "sending model request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", &self.anthropic_version)
            .json(&body)
            .send()
            .await
            .context("model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            bail!("model endpoint returned {status}: {snippet}");
        }

        let wire: WireResponse =
            response.json().await.context("failed to decode model response")?;
        Ok(wire.into())
    }
}
