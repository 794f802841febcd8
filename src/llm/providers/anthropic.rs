//! Anthropic Messages API adapter.
//!
//! Streams `/v1/messages` and routes the content_block_start / delta / stop
//! vocabulary into the turn. Thinking and redacted-thinking blocks map to
//! reasoning channels keyed by block index; `tool_use` blocks map to
//! accumulator entries under the same index. Server-side tool blocks
//! (`server_tool_use`, `web_search_tool_result`) are ignored.

use super::{
    drive, encode_attachments, parse_event, post_stream, with_extra_headers, Flow, SseHandler,
    TurnContext,
};
use crate::error::LlmError;
use crate::llm::accumulator::CallKey;
use crate::llm::attachments::{apply_cache_boundary, EncodedAttachment, PDF_MEDIA_TYPE};
use crate::llm::reasoning::ReasoningChannel;
use crate::llm::sse::SseEvent;
use crate::llm::traits::{ModelConfig, Vendor};
use crate::llm::turn::Turn;
use crate::types::{Message, Tool};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Smallest thinking budget the API accepts
pub const MIN_THINKING_BUDGET: u32 = 1024;

/// Output-token ceilings by model family, most specific first
const MAX_OUTPUT_TOKENS: &[(&str, u32)] = &[
    ("opus-4-5", 64000),
    ("opus-4", 32000),
    ("sonnet-4", 64000),
    ("haiku-4", 64000),
    ("3-7-sonnet", 64000),
    ("3-5-sonnet", 8192),
    ("3-5-haiku", 8192),
];

/// Ceiling for families not in the table
const FALLBACK_MAX_TOKENS: u32 = 4096;

/// Output-token ceiling used when the caller sets none
pub fn default_max_tokens(model_id: &str) -> u32 {
    MAX_OUTPUT_TOKENS
        .iter()
        .find(|(family, _)| model_id.contains(family))
        .map(|(_, ceiling)| *ceiling)
        .unwrap_or(FALLBACK_MAX_TOKENS)
}

/// Thinking budget for a turn, clamped into `[1024, max_tokens - 1]`.
///
/// `None` when no reasoning knob is set, or when the ceiling leaves no room
/// for the minimum budget.
pub fn thinking_budget(model: &ModelConfig, max_tokens: u32) -> Option<u32> {
    if !model.wants_reasoning() {
        return None;
    }
    if max_tokens <= MIN_THINKING_BUDGET {
        tracing::warn!(
            "💭 max_tokens {} leaves no room for extended thinking, disabling it",
            max_tokens
        );
        return None;
    }
    let requested = model
        .thinking_budget
        .or_else(|| model.reasoning_effort.map(|effort| effort.default_budget()))
        .unwrap_or(MIN_THINKING_BUDGET);
    Some(requested.clamp(MIN_THINKING_BUDGET, max_tokens - 1))
}

fn attachment_block(encoded: EncodedAttachment) -> Value {
    match encoded {
        EncodedAttachment::Text(text) | EncodedAttachment::Placeholder(text) => {
            json!({"type": "text", "text": text})
        }
        EncodedAttachment::Image { media_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data}
        }),
        EncodedAttachment::Document { name, data } => json!({
            "type": "document",
            "title": name,
            "source": {"type": "base64", "media_type": PDF_MEDIA_TYPE, "data": data}
        }),
    }
}

/// Convert the conversation to Anthropic messages, placing the cache boundary
pub async fn convert_messages(conversation: &[Message], vendor: Vendor) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut attachment_bearing = Vec::new();

    for message in conversation {
        match message {
            Message::User {
                content,
                attachments,
            } => {
                let mut blocks: Vec<Value> = encode_attachments(attachments, vendor)
                    .await
                    .into_iter()
                    .map(attachment_block)
                    .collect();
                if !content.is_empty() {
                    blocks.push(json!({"type": "text", "text": content}));
                }
                if blocks.is_empty() {
                    continue;
                }
                if !attachments.is_empty() {
                    attachment_bearing.push(messages.len());
                }
                messages.push(json!({"role": "user", "content": blocks}));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({"type": "text", "text": content}));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": Value::Object(call.arguments.clone())
                    }));
                }
                if !blocks.is_empty() {
                    messages.push(json!({"role": "assistant", "content": blocks}));
                }
            }
            Message::ToolResults { results } => {
                let blocks: Vec<Value> = results
                    .iter()
                    .map(|result| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": result.id,
                            "content": result.content
                        })
                    })
                    .collect();
                if !blocks.is_empty() {
                    messages.push(json!({"role": "user", "content": blocks}));
                }
            }
        }
    }

    if vendor.capabilities().cache_boundary {
        apply_cache_boundary(&mut messages, &attachment_bearing);
    }
    messages
}

fn convert_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema
            })
        })
        .collect()
}

/// Build the streaming request body
pub async fn build_body(ctx: &TurnContext<'_>) -> Value {
    let model = &ctx.request.model;
    let max_tokens = model
        .max_tokens
        .unwrap_or_else(|| default_max_tokens(ctx.model_id));

    let mut body = json!({
        "model": ctx.model_id,
        "max_tokens": max_tokens,
        "stream": true,
        "messages": convert_messages(&ctx.request.conversation, ctx.vendor).await
    });

    if let Some(system) = model.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body["system"] = json!(system);
    }

    if !ctx.request.tools.is_empty() {
        body["tools"] = json!(convert_tools(&ctx.request.tools));
    }

    match thinking_budget(model, max_tokens) {
        Some(budget) => {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        None => {
            if let Some(temperature) = model.temperature {
                body["temperature"] = json!(temperature);
            }
        }
    }

    body
}

/// Stream one turn from the Messages API
pub async fn stream(ctx: &TurnContext<'_>, turn: &mut Turn<'_>) -> Result<(), LlmError> {
    tracing::info!(
        "🌊 Anthropic streaming request starting for model: {}",
        ctx.model_id
    );
    let api_key = ctx.api_key()?;
    let body = build_body(ctx).await;

    let url = format!("{}/v1/messages", ctx.base_url);
    tracing::trace!("🌊 Anthropic streaming POST to: {}", url);

    let request = ctx
        .client
        .post(&url)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body);
    let response = post_stream(ctx.vendor, with_extra_headers(request, ctx.extra_headers())).await?;

    let mut handler = AnthropicHandler::new(ctx.vendor);
    drive(ctx.vendor, response, &mut handler, turn).await
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta,
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking,
    RedactedThinking,
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    Ignored,
}

/// Routes Messages API events into a turn
#[derive(Debug)]
pub struct AnthropicHandler {
    vendor: Vendor,
    blocks: HashMap<usize, BlockKind>,
}

impl AnthropicHandler {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            blocks: HashMap::new(),
        }
    }

    fn block(&self, index: usize) -> Option<BlockKind> {
        self.blocks.get(&index).copied()
    }
}

impl SseHandler for AnthropicHandler {
    fn handle(&mut self, event: &SseEvent, turn: &mut Turn<'_>) -> Result<Flow, LlmError> {
        let parsed: StreamEvent = parse_event(self.vendor, event)?;
        tracing::trace!("🌊 Anthropic event: {:?}", parsed);

        match parsed {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let kind = match content_block {
                    ContentBlock::Text { text } => {
                        turn.text(&text);
                        BlockKind::Text
                    }
                    ContentBlock::Thinking => {
                        turn.begin_reasoning(ReasoningChannel::Indexed(index));
                        BlockKind::Thinking
                    }
                    ContentBlock::RedactedThinking => {
                        turn.redacted(ReasoningChannel::Indexed(index));
                        BlockKind::Thinking
                    }
                    ContentBlock::ToolUse { id, name } => {
                        turn.open_call(CallKey::Index(index), Some(id), name);
                        BlockKind::ToolUse
                    }
                    ContentBlock::Other => {
                        tracing::debug!("🔧 Ignoring server-side content block at index {}", index);
                        BlockKind::Ignored
                    }
                };
                self.blocks.insert(index, kind);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if self.block(index) == Some(BlockKind::Ignored) {
                    return Ok(Flow::Continue);
                }
                match delta {
                    Delta::TextDelta { text } => turn.text(&text),
                    Delta::ThinkingDelta { thinking } => {
                        turn.reasoning(ReasoningChannel::Indexed(index), &thinking)
                    }
                    Delta::InputJsonDelta { partial_json } => {
                        turn.calls().append(&CallKey::Index(index), &partial_json)
                    }
                    Delta::Other => {}
                }
            }
            StreamEvent::ContentBlockStop { index } => match self.block(index) {
                Some(BlockKind::Thinking) => turn.end_reasoning(),
                Some(BlockKind::ToolUse) => turn.calls().finalize(&CallKey::Index(index)),
                _ => {}
            },
            StreamEvent::MessageStop => {
                tracing::debug!("🌊 Anthropic message stop");
                return Ok(Flow::Done);
            }
            StreamEvent::Error { error } => {
                return Err(LlmError::protocol(
                    self.vendor,
                    format!("{}: {}", error.kind, error.message),
                ));
            }
            StreamEvent::MessageStart
            | StreamEvent::MessageDelta
            | StreamEvent::Ping
            | StreamEvent::Unknown => {}
        }
        Ok(Flow::Continue)
    }
}
