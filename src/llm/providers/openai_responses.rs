//! OpenAI Responses API adapter.
//!
//! The Responses stream is a single union of `type`-tagged events. Text,
//! reasoning-summary deltas, and function-call items are routed into the
//! turn; native tool items (`web_search_call`, `file_search_call`, ...) are
//! ignored.

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

fn input_part(encoded: EncodedAttachment) -> Value {
    let data_url = encoded.data_url();
    match encoded {
        EncodedAttachment::Text(text) | EncodedAttachment::Placeholder(text) => {
            json!({"type": "input_text", "text": text})
        }
        EncodedAttachment::Image { .. } => json!({
            "type": "input_image",
            "image_url": data_url
        }),
        EncodedAttachment::Document { name, .. } => json!({
            "type": "input_file",
            "filename": name,
            "file_data": data_url
        }),
    }
}

/// Convert the conversation to Responses input items
pub async fn convert_input(conversation: &[Message], vendor: Vendor) -> Vec<Value> {
    let mut items = Vec::new();

    for message in conversation {
        match message {
            Message::User {
                content,
                attachments,
            } => {
                let mut parts: Vec<Value> = encode_attachments(attachments, vendor)
                    .await
                    .into_iter()
                    .map(input_part)
                    .collect();
                if !content.is_empty() || parts.is_empty() {
                    parts.push(json!({"type": "input_text", "text": content}));
                }
                items.push(json!({"role": "user", "content": parts}));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if !content.is_empty() {
                    items.push(json!({
                        "role": "assistant",
                        "content": [{"type": "output_text", "text": content}]
                    }));
                }
                for call in tool_calls {
                    items.push(json!({
                        "type": "function_call",
                        "call_id": call.id,
                        "name": call.name,
                        "arguments": arguments_string(&call.arguments)
                    }));
                }
            }
            Message::ToolResults { results } => {
                for result in results {
                    items.push(json!({
                        "type": "function_call_output",
                        "call_id": result.id,
                        "output": result.content
                    }));
                }
            }
        }
    }

    items
}

fn convert_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema
            })
        })
        .collect()
}

/// Build the streaming request body
pub async fn build_body(ctx: &TurnContext<'_>) -> Value {
    let model = &ctx.request.model;
    let mut body = json!({
        "model": ctx.model_id,
        "input": convert_input(&ctx.request.conversation, ctx.vendor).await,
        "stream": true
    });

    if let Some(system) = model.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body["instructions"] = json!(system);
    }
    if !ctx.request.tools.is_empty() {
        body["tools"] = json!(convert_tools(&ctx.request.tools));
    }
    if let Some(max_tokens) = model.max_tokens {
        body["max_output_tokens"] = json!(max_tokens);
    }
    match reasoning_config(model) {
        Some(reasoning) => body["reasoning"] = reasoning,
        None => {
            if let Some(temperature) = model.temperature {
                body["temperature"] = json!(temperature);
            }
        }
    }

    body
}

/// `reasoning` object: summaries follow `show_reasoning`, effort is optional
fn reasoning_config(model: &ModelConfig) -> Option<Value> {
    if model.reasoning_effort.is_none() && !model.show_reasoning {
        return None;
    }
    let mut reasoning = json!({});
    if let Some(effort) = model.reasoning_effort {
        reasoning["effort"] = json!(effort.as_str());
    }
    if model.show_reasoning {
        reasoning["summary"] = json!("auto");
    }
    Some(reasoning)
}

/// Stream one turn from the Responses API
pub async fn stream(ctx: &TurnContext<'_>, turn: &mut Turn<'_>) -> Result<(), LlmError> {
    tracing::info!(
        "🌊 OpenAI Responses streaming request starting for model: {}",
        ctx.model_id
    );
    let api_key = ctx.api_key()?;
    let body = build_body(ctx).await;

    let url = format!("{}/responses", ctx.base_url);
    tracing::trace!("🌊 OpenAI streaming POST to: {}", url);

    let request = ctx.client.post(&url).bearer_auth(api_key).json(&body);
    let response = post_stream(ctx.vendor, with_extra_headers(request, ctx.extra_headers())).await?;

    let mut handler = ResponsesHandler::new(ctx.vendor);
    drive(ctx.vendor, response, &mut handler, turn).await
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta {
        #[serde(default)]
        summary_index: usize,
        delta: String,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    ArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    ArgumentsDone { item_id: String, arguments: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "response.incomplete")]
    Incomplete,
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: Value,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    Reasoning,
    #[serde(other)]
    Other,
}

/// Routes Responses API events into a turn
#[derive(Debug)]
pub struct ResponsesHandler {
    vendor: Vendor,
}

impl ResponsesHandler {
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }
}

impl SseHandler for ResponsesHandler {
    fn handle(&mut self, event: &SseEvent, turn: &mut Turn<'_>) -> Result<Flow, LlmError> {
        let parsed: ResponseEvent = parse_event(self.vendor, event)?;
        tracing::trace!("🌊 Responses event: {:?}", parsed);

        match parsed {
            ResponseEvent::OutputTextDelta { delta } => turn.text(&delta),
            ResponseEvent::ReasoningSummaryDelta {
                summary_index,
                delta,
            } => turn.reasoning(ReasoningChannel::Indexed(summary_index), &delta),
            ResponseEvent::OutputItemAdded { item } => {
                if let OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                } = item
                {
                    let key = CallKey::Item(id);
                    turn.open_call(key.clone(), Some(call_id), name);
                    if !arguments.is_empty() {
                        turn.calls().append(&key, &arguments);
                    }
                }
            }
            ResponseEvent::ArgumentsDelta { item_id, delta } => {
                turn.calls().append(&CallKey::Item(item_id), &delta)
            }
            ResponseEvent::ArgumentsDone { item_id, arguments } => {
                turn.calls().finalize_with(&CallKey::Item(item_id), &arguments)
            }
            ResponseEvent::OutputItemDone { item } => match item {
                OutputItem::Reasoning => turn.end_reasoning(),
                OutputItem::FunctionCall { id, arguments, .. } => {
                    turn.calls().finalize_with(&CallKey::Item(id), &arguments)
                }
                OutputItem::Other => {}
            },
            ResponseEvent::Completed => return Ok(Flow::Done),
            ResponseEvent::Incomplete => {
                tracing::warn!("🌊 OpenAI response ended incomplete");
                return Ok(Flow::Done);
            }
            ResponseEvent::Failed { response } => {
                let message = response
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("response failed");
                let code = response.pointer("/error/code").and_then(Value::as_str);
                return Err(LlmError::protocol(self.vendor, with_code(code, message)));
            }
            ResponseEvent::Error { code, message } => {
                return Err(LlmError::protocol(
                    self.vendor,
                    with_code(code.as_deref(), &message),
                ));
            }
            ResponseEvent::Other => {}
        }
        Ok(Flow::Continue)
    }
}

// The code carries the classification the message text may omit
fn with_code(code: Option<&str>, message: &str) -> String {
    match code.filter(|c| !c.is_empty()) {
        Some(code) => format!("{}: {}", code, message),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::reasoning::{closing_chunk, THINK_OPEN};
    use crate::llm::sink::NullSink;
    use crate::llm::traits::ReasoningEffort;
    use crate::types::{ToolCall, ToolResult};

    fn event(payload: Value) -> SseEvent {
        SseEvent {
            event: payload["type"].as_str().map(str::to_string),
            data: payload.to_string(),
        }
    }

    #[test]
    fn test_reasoning_summary_then_text() {
        let sink = NullSink;
        let mut turn = Turn::new(&sink, true, &[]);
        let mut handler = ResponsesHandler::new(Vendor::OpenAi);

        let mut flow = Flow::Continue;
        for payload in [
            json!({"type": "response.created", "response": {"id": "resp_1"}}),
            json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1", "summary": []}}),
            json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "summary_index": 0, "delta": "Plan"}),
            json!({"type": "response.output_item.done", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1"}}),
            json!({"type": "response.output_item.added", "output_index": 1, "item": {"type": "message", "id": "msg_1"}}),
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Done"}),
            json!({"type": "response.completed", "response": {"id": "resp_1"}}),
        ] {
            flow = handler.handle(&event(payload), &mut turn).unwrap();
        }

        assert_eq!(flow, Flow::Done);
        assert_eq!(
            turn.drain_pending(),
            vec![
                THINK_OPEN.to_string(),
                "Plan".to_string(),
                closing_chunk(1),
                "Done".to_string()
            ]
        );
    }

    #[test]
    fn test_function_call_items() {
        let sink = NullSink;
        let tools = vec![Tool::new("search", "Search", json!({"type": "object"}))];
        let mut turn = Turn::new(&sink, false, &tools);
        let mut handler = ResponsesHandler::new(Vendor::OpenAi);

        for payload in [
            json!({"type": "response.output_item.added", "item": {"type": "web_search_call", "id": "ws_1"}}),
            json!({"type": "response.output_item.added", "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "search", "arguments": ""}}),
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "{\"q\":"}),
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "\"rust\"}"}),
            json!({"type": "response.function_call_arguments.done", "item_id": "fc_1", "arguments": "{\"q\":\"rust\"}"}),
            json!({"type": "response.output_item.done", "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "search", "arguments": "{\"q\":\"rust\"}"}}),
        ] {
            handler.handle(&event(payload), &mut turn).unwrap();
        }

        let (_, calls) = turn.into_outcome();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments["q"], json!("rust"));
    }

    #[test]
    fn test_failed_response() {
        let sink = NullSink;
        let mut turn = Turn::new(&sink, false, &[]);
        let mut handler = ResponsesHandler::new(Vendor::OpenAi);
        let err = handler
            .handle(
                &event(json!({"type": "response.failed", "response": {"error": {
                    "code": "context_length_exceeded",
                    "message": "Your input exceeds the context window of this model. Please adjust your input and try again."
                }}})),
                &mut turn,
            )
            .unwrap_err();
        assert!(err.is_context_limit());
        assert!(err
            .to_string()
            .contains("context_length_exceeded: Your input exceeds the context window"));
    }

    #[test]
    fn test_reasoning_config() {
        let mut model = ModelConfig::new("o4-mini");
        model.show_reasoning = false;
        assert_eq!(reasoning_config(&model), None);

        model.show_reasoning = true;
        assert_eq!(reasoning_config(&model), Some(json!({"summary": "auto"})));

        model.reasoning_effort = Some(ReasoningEffort::Low);
        assert_eq!(
            reasoning_config(&model),
            Some(json!({"effort": "low", "summary": "auto"}))
        );

        model.show_reasoning = false;
        assert_eq!(reasoning_config(&model), Some(json!({"effort": "low"})));
    }

    #[test]
    fn test_error_event_without_code() {
        let sink = NullSink;
        let mut turn = Turn::new(&sink, false, &[]);
        let mut handler = ResponsesHandler::new(Vendor::OpenAi);
        let err = handler
            .handle(
                &event(json!({"type": "error", "message": "Rate limit reached"})),
                &mut turn,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "openai stream error: Rate limit reached");
        assert!(!err.is_context_limit());
    }

    #[tokio::test]
    async fn test_convert_input_items() {
        let conversation = vec![
            Message::user("hi"),
            Message::assistant_with_calls(
                "Searching",
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "search".to_string(),
                    arguments: serde_json::Map::new(),
                    metadata: None,
                }],
            ),
            Message::tool_results(vec![ToolResult::new("call_1", "nothing found")]),
        ];
        let items = convert_input(&conversation, Vendor::OpenAi).await;

        assert_eq!(items.len(), 4);
        assert_eq!(items[0]["content"][0], json!({"type": "input_text", "text": "hi"}));
        assert_eq!(items[1]["content"][0]["type"], json!("output_text"));
        assert_eq!(items[2]["type"], json!("function_call"));
        assert_eq!(items[2]["arguments"], json!("{}"));
        assert_eq!(items[3], json!({"type": "function_call_output", "call_id": "call_1", "output": "nothing found"}));
    }
}
