//! Model-facing message types in Messages-API shape.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "content_from_text_or_blocks")]
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content }
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }
}

/// Accepts either a bare string or a list of blocks, as callers send both.
fn content_from_text_or_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawContent {
        Text(String),
        Blocks(Vec<ContentBlock>),
    }

    Ok(match RawContent::deserialize(deserializer)? {
        RawContent::Text(text) => vec![ContentBlock::Text { text }],
        RawContent::Blocks(blocks) => blocks,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    pub fn accumulate(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ModelResponse {
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }

    /// Tool-use blocks in the order the model emitted them.
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some(ToolUse { id: id.clone(), name: name.clone(), input: input.clone() })
                }
                _ => None,
            })
            .collect()
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContentBlock, Message, Role, StopReason};

    #[test]
    fn content_blocks_use_messages_api_tags() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: "{}".to_string(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&block).expect("serialize"),
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "{}"})
        );
    }

    #[test]
    fn message_content_accepts_plain_strings() {
        let message: Message =
            serde_json::from_value(json!({"role": "user", "content": "need a centrifuge"}))
                .expect("deserialize");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "need a centrifuge");
    }

    #[test]
    fn unknown_stop_reasons_do_not_fail_decoding() {
        let reason: StopReason = serde_json::from_value(json!("pause_turn")).expect("decode");
        assert_eq!(reason, StopReason::Other);
    }
}
