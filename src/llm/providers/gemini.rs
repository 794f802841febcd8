//! Gemini `streamGenerateContent` adapter.
//!
//! Two authentication flavours share one wire format:
//!
//! - **Gemini API**: `x-goog-api-key` against the public endpoint
//! - **Vertex AI**: a bearer token obtained by exchanging a service account
//!   assertion through the process-wide token cache, against a regional host
//!
//! Parts flagged `thought: true` are reasoning on a single channel; ordinary
//! text parts are answer text; `functionCall` parts arrive complete and are
//! inserted under synthetic keys.

use super::{
    drive, encode_attachments, parse_event, post_stream, with_extra_headers, Flow, SseHandler,
    TurnContext,
};
use crate::error::LlmError;
use crate::llm::attachments::{EncodedAttachment, PDF_MEDIA_TYPE};
use crate::llm::reasoning::ReasoningChannel;
use crate::llm::sse::SseEvent;
use crate::llm::token_cache::{service_account_token, ServiceAccountKey, TokenCacheError};
use crate::llm::traits::{ModelConfig, Vendor};
use crate::llm::turn::Turn;
use crate::types::{Message, Tool};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Region used for Vertex when none is configured
pub const DEFAULT_VERTEX_REGION: &str = "us-central1";

/// Schema keywords the function-declaration validator rejects
const UNSUPPORTED_SCHEMA_KEYS: [&str; 2] = ["$schema", "additionalProperties"];

/// Streaming endpoint on the Gemini API
pub fn gemini_url(base_url: &str, model_id: &str) -> String {
    format!(
        "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
        base_url, model_id
    )
}

/// Streaming endpoint on Vertex AI.
///
/// The host is regional unless `base_override` is given.
pub fn vertex_url(base_override: Option<&str>, project: &str, region: &str, model_id: &str) -> String {
    let host = match base_override {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("https://{}-aiplatform.googleapis.com", region),
    };
    format!(
        "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:streamGenerateContent?alt=sse",
        host, project, region, model_id
    )
}

/// Strip schema keywords Gemini does not accept, at every depth
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), sanitize_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

fn attachment_part(encoded: EncodedAttachment) -> Value {
    match encoded {
        EncodedAttachment::Text(text) | EncodedAttachment::Placeholder(text) => {
            json!({"text": text})
        }
        EncodedAttachment::Image { media_type, data } => {
            json!({"inlineData": {"mimeType": media_type, "data": data}})
        }
        EncodedAttachment::Document { data, .. } => {
            json!({"inlineData": {"mimeType": PDF_MEDIA_TYPE, "data": data}})
        }
    }
}

/// Convert the conversation to Gemini contents.
///
/// Function responses must carry the function name, so names are looked up
/// from the assistant calls that precede them.
pub async fn convert_contents(conversation: &[Message], vendor: Vendor) -> Vec<Value> {
    let mut contents = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for message in conversation {
        match message {
            Message::User {
                content,
                attachments,
            } => {
                let mut parts: Vec<Value> = encode_attachments(attachments, vendor)
                    .await
                    .into_iter()
                    .map(attachment_part)
                    .collect();
                if !content.is_empty() || parts.is_empty() {
                    parts.push(json!({"text": content}));
                }
                contents.push(json!({"role": "user", "parts": parts}));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(json!({"text": content}));
                }
                for call in tool_calls {
                    call_names.insert(call.id.as_str(), call.name.as_str());
                    parts.push(json!({
                        "functionCall": {
                            "name": call.name,
                            "args": Value::Object(call.arguments.clone())
                        }
                    }));
                }
                if !parts.is_empty() {
                    contents.push(json!({"role": "model", "parts": parts}));
                }
            }
            Message::ToolResults { results } => {
                let parts: Vec<Value> = results
                    .iter()
                    .map(|result| {
                        let name = call_names
                            .get(result.id.as_str())
                            .copied()
                            .unwrap_or(result.id.as_str());
                        json!({
                            "functionResponse": {
                                "name": name,
                                "response": {"content": result.content}
                            }
                        })
                    })
                    .collect();
                if !parts.is_empty() {
                    contents.push(json!({"role": "user", "parts": parts}));
                }
            }
        }
    }

    contents
}

fn convert_tools(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": sanitize_schema(&tool.input_schema)
            })
        })
        .collect();
    json!([{"functionDeclarations": declarations}])
}

fn generation_config(model: &ModelConfig) -> Value {
    let mut config = json!({});
    if let Some(max_tokens) = model.max_tokens {
        config["maxOutputTokens"] = json!(max_tokens);
    }
    if let Some(temperature) = model.temperature {
        config["temperature"] = json!(temperature);
    }
    if model.wants_reasoning() || model.show_reasoning {
        let mut thinking = json!({"includeThoughts": model.show_reasoning});
        let budget = model
            .thinking_budget
            .or_else(|| model.reasoning_effort.map(|effort| effort.default_budget()));
        if let Some(budget) = budget {
            thinking["thinkingBudget"] = json!(budget);
        }
        config["thinkingConfig"] = thinking;
    }
    config
}

/// Build the streaming request body
pub async fn build_body(ctx: &TurnContext<'_>) -> Value {
    let model = &ctx.request.model;
    let mut body = json!({
        "contents": convert_contents(&ctx.request.conversation, ctx.vendor).await,
        "generationConfig": generation_config(model)
    });

    if let Some(system) = model.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    if !ctx.request.tools.is_empty() {
        body["tools"] = convert_tools(&ctx.request.tools);
    }

    body
}

fn token_error(error: TokenCacheError) -> LlmError {
    match error {
        TokenCacheError::Exchange { status, message } => LlmError::TransportError {
            vendor: Vendor::Vertex,
            status,
            message: format!("token exchange failed: {}", message),
            source: None,
        },
        other => LlmError::configuration(other.to_string()),
    }
}

async fn vertex_request(ctx: &TurnContext<'_>, body: &Value) -> Result<reqwest::RequestBuilder, LlmError> {
    let credentials = &ctx.request.credentials;
    let region = credentials
        .region
        .as_deref()
        .unwrap_or(DEFAULT_VERTEX_REGION);

    let json = credentials.service_account.as_deref().ok_or_else(|| {
        LlmError::configuration("vertex requires a service account key")
    })?;
    let key = ServiceAccountKey::from_json(json).map_err(token_error)?;
    let project = key
        .project_id
        .clone()
        .ok_or_else(|| LlmError::configuration("vertex service account has no project_id"))?;
    let token = service_account_token(ctx.client, &key)
        .await
        .map_err(token_error)?;

    let url = vertex_url(credentials.base_url.as_deref(), &project, region, ctx.model_id);
    tracing::trace!("🌊 Vertex streaming POST to: {}", url);
    Ok(ctx.client.post(&url).bearer_auth(token).json(body))
}

/// Stream one turn from Gemini or Vertex
pub async fn stream(ctx: &TurnContext<'_>, turn: &mut Turn<'_>) -> Result<(), LlmError> {
    tracing::info!(
        "🌊 {} streaming request starting for model: {}",
        ctx.vendor,
        ctx.model_id
    );
    let body = build_body(ctx).await;

    let request = match ctx.vendor {
        Vendor::Vertex => vertex_request(ctx, &body).await?,
        _ => {
            let api_key = ctx.api_key()?;
            let url = gemini_url(ctx.base_url, ctx.model_id);
            tracing::trace!("🌊 Gemini streaming POST to: {}", url);
            ctx.client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
        }
    };
    let response = post_stream(ctx.vendor, with_extra_headers(request, ctx.extra_headers())).await?;

    let mut handler = GeminiHandler::new(ctx.vendor);
    drive(ctx.vendor, response, &mut handler, turn).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Routes generateContent chunks into a turn
#[derive(Debug)]
pub struct GeminiHandler {
    vendor: Vendor,
}

impl GeminiHandler {
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }
}

impl SseHandler for GeminiHandler {
    fn handle(&mut self, event: &SseEvent, turn: &mut Turn<'_>) -> Result<Flow, LlmError> {
        let chunk: GenerateResponse = parse_event(self.vendor, event)?;

        if let Some(error) = chunk.error {
            return Err(LlmError::protocol(self.vendor, error.message));
        }
        if let Some(usage) = &chunk.usage_metadata {
            tracing::trace!("🌊 {} usage: {}", self.vendor, usage);
        }

        for candidate in chunk.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(call) = part.function_call {
                    tracing::debug!("🔧 {} function call: {}", self.vendor, call.name);
                    turn.calls().insert_complete(call.id, call.name, call.args);
                } else if let Some(text) = part.text.as_deref() {
                    if part.thought {
                        turn.reasoning(ReasoningChannel::Single, text);
                    } else {
                        turn.text(text);
                    }
                }
            }
            if let Some(reason) = candidate.finish_reason {
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
