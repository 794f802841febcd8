//! OpenAI-compatible chat completions adapter.
//!
//! Serves DeepSeek, OpenRouter, Ollama, LM Studio, Groq and Mistral. The
//! stream is delta-only: each chunk carries `choices[0].delta` with text,
//! reasoning (`reasoning_content` or `reasoning`) and tool-call fragments
//! keyed by `index`. Calls are finalized when the stream ends.

use super::retry::send_with_quirk_retry;
use super::{
    arguments_string, drive, encode_attachments, parse_event, post_stream, with_extra_headers,
    Flow, SseHandler, TurnContext,
};
use crate::error::LlmError;
use crate::llm::accumulator::CallKey;
use crate::llm::attachments::EncodedAttachment;
use crate::llm::reasoning::ReasoningChannel;
use crate::llm::sse::SseEvent;
use crate::llm::traits::{ModelConfig, Vendor};
use crate::llm::turn::Turn;
use crate::types::{Message, Tool};
use serde::Deserialize;
use serde_json::{json, Value};

/// Parameter added speculatively and dropped if the server rejects it
pub const STREAM_OPTIONS: &str = "stream_options";

fn content_part(encoded: EncodedAttachment) -> Value {
    match encoded {
        EncodedAttachment::Text(text) | EncodedAttachment::Placeholder(text) => {
            json!({"type": "text", "text": text})
        }
        image @ EncodedAttachment::Image { .. } => json!({
            "type": "image_url",
            "image_url": {"url": image.data_url().unwrap_or_default()}
        }),
        EncodedAttachment::Document { name, .. } => json!({
            "type": "text",
            "text": format!("[Attachment \"{}\" omitted: documents are not supported here]", name)
        }),
    }
}

/// Convert the conversation to chat completion messages
pub async fn convert_messages(
    conversation: &[Message],
    system_prompt: Option<&str>,
    vendor: Vendor,
) -> Vec<Value> {
    let mut openai_messages = Vec::new();

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        openai_messages.push(json!({"role": "system", "content": system}));
    }

    for message in conversation {
        match message {
            Message::User {
                content,
                attachments,
            } => {
                if attachments.is_empty() {
                    openai_messages.push(json!({"role": "user", "content": content}));
                    continue;
                }
                let mut parts: Vec<Value> = encode_attachments(attachments, vendor)
                    .await
                    .into_iter()
                    .map(content_part)
                    .collect();
                if !content.is_empty() {
                    parts.push(json!({"type": "text", "text": content}));
                }
                openai_messages.push(json!({"role": "user", "content": parts}));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if content.is_empty() && tool_calls.is_empty() {
                    continue;
                }
                let mut message_json = json!({
                    "role": "assistant",
                    "content": if content.is_empty() { None } else { Some(content) }
                });
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": arguments_string(&call.arguments)
                                }
                            })
                        })
                        .collect();
                    message_json["tool_calls"] = Value::Array(calls);
                }
                openai_messages.push(message_json);
            }
            Message::ToolResults { results } => {
                for result in results {
                    openai_messages.push(json!({
                        "role": "tool",
                        "tool_call_id": result.id,
                        "content": result.content
                    }));
                }
            }
        }
    }

    openai_messages
}

/// Convert tool declarations to the function-tool format
pub fn convert_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema
                }
            })
        })
        .collect()
}

/// Build the streaming request body, without the speculative parameter
pub async fn build_body(ctx: &TurnContext<'_>) -> Value {
    let model = &ctx.request.model;
    let mut body = json!({
        "model": ctx.model_id,
        "messages": convert_messages(
            &ctx.request.conversation,
            model.system_prompt.as_deref(),
            ctx.vendor
        ).await,
        "stream": true
    });

    if !ctx.request.tools.is_empty() {
        body["tools"] = json!(convert_tools(&ctx.request.tools));
    }
    if let Some(max_tokens) = model.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = model.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(effort) = effort_hint(ctx.vendor, model) {
        body["reasoning_effort"] = json!(effort);
    }

    body
}

/// Effort hint for vendors that accept one; others never see the field
fn effort_hint(vendor: Vendor, model: &ModelConfig) -> Option<&'static str> {
    let effort = model.reasoning_effort?;
    if !vendor.capabilities().reasoning_effort {
        tracing::debug!("🔧 {} takes no reasoning effort hint, omitting it", vendor);
        return None;
    }
    Some(effort.as_str())
}

/// Stream one turn from a chat completions endpoint
pub async fn stream(ctx: &TurnContext<'_>, turn: &mut Turn<'_>) -> Result<(), LlmError> {
    tracing::info!(
        "🌊 {} streaming request starting for model: {}",
        ctx.vendor,
        ctx.model_id
    );
    let body = build_body(ctx).await;
    let url = format!("{}/chat/completions", ctx.base_url);
    tracing::trace!("🌊 {} streaming POST to: {}", ctx.vendor, url);

    let api_key = ctx.request.credentials.api_key.clone();
    let response = send_with_quirk_retry(STREAM_OPTIONS, |include| {
        let mut body = body.clone();
        if include {
            body[STREAM_OPTIONS] = json!({"include_usage": true});
        }
        let mut request = ctx.client.post(&url).json(&body);
        if let Some(key) = api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        Box::pin(post_stream(
            ctx.vendor,
            with_extra_headers(request, ctx.extra_headers()),
        ))
    })
    .await?;

    let mut handler = ChatHandler::new(ctx.vendor);
    drive(ctx.vendor, response, &mut handler, turn).await
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ChunkError>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<ChoiceDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

/// Routes chat completion chunks into a turn
#[derive(Debug)]
pub struct ChatHandler {
    vendor: Vendor,
    last_key: Option<CallKey>,
}

impl ChatHandler {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            last_key: None,
        }
    }

    // Index when present, then id; fragments with neither continue the
    // previous call, or start a synthetic one
    fn key_for(&mut self, delta: &ToolCallDelta, turn: &mut Turn<'_>) -> CallKey {
        let key = match (delta.index, delta.id.as_deref().filter(|id| !id.is_empty())) {
            (Some(index), _) => CallKey::Index(index),
            (None, Some(id)) => CallKey::Id(id.to_string()),
            (None, None) => match &self.last_key {
                Some(key) => key.clone(),
                None => turn.calls().synthetic_key(),
            },
        };
        self.last_key = Some(key.clone());
        key
    }

    fn tool_call(&mut self, delta: ToolCallDelta, turn: &mut Turn<'_>) {
        let key = self.key_for(&delta, turn);
        let (name, arguments) = match delta.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        if name.is_some() || delta.id.is_some() {
            turn.open_call(key.clone(), delta.id, name.unwrap_or_default());
        }
        if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
            turn.calls().append(&key, &arguments);
        }
    }
}

impl SseHandler for ChatHandler {
    fn handle(&mut self, event: &SseEvent, turn: &mut Turn<'_>) -> Result<Flow, LlmError> {
        let chunk: Chunk = parse_event(self.vendor, event)?;

        if let Some(error) = chunk.error {
            return Err(LlmError::protocol(self.vendor, error.message));
        }
        if let Some(usage) = &chunk.usage {
            tracing::debug!("🌊 {} usage: {}", self.vendor, usage);
        }

        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(reasoning) = delta
                    .reasoning_content
                    .as_deref()
                    .or(delta.reasoning.as_deref())
                    .filter(|r| !r.is_empty())
                {
                    turn.reasoning(ReasoningChannel::Single, reasoning);
                }
                if let Some(content) = delta.content.as_deref() {
                    turn.text(content);
                }
                for call in delta.tool_calls.unwrap_or_default() {
                    self.tool_call(call, turn);
                }
            }
            if let Some(reason) = choice.finish_reason {
                tracing::debug!("🌊 {} finish reason: {}", self.vendor, reason);
            }
        }
        Ok(Flow::Continue)
    }

    fn finish(&mut self, turn: &mut Turn<'_>) -> Result<(), LlmError> {
        turn.end_reasoning();
        Ok(())
    }
}
