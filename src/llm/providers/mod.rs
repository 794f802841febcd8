//! Provider adapters, one per wire-protocol family.
//!
//! - `anthropic` - Anthropic Messages API
//! - `openai_chat` - OpenAI-compatible chat completions (DeepSeek, OpenRouter,
//!   Ollama, LM Studio, Groq, Mistral)
//! - `openai_responses` - OpenAI Responses API
//! - `gemini` - Gemini `streamGenerateContent`, API key or Vertex service account
//!
//! Every adapter translates the canonical conversation into its vendor
//! request, opens the stream through [`post_stream`], and routes decoded
//! events into the [`Turn`] via an [`SseHandler`] driven by [`drive`].

pub mod anthropic;
pub mod gemini;
pub mod openai_chat;
pub mod openai_responses;
pub mod retry;

use crate::error::LlmError;
use crate::llm::attachments::{encode, EncodedAttachment};
use crate::llm::sse::{self, SseEvent};
use crate::llm::traits::{Protocol, StreamRequest, Vendor};
use crate::llm::turn::Turn;
use crate::types::Attachment;
use crate::utils::logging::sanitize_for_logging;
use futures::StreamExt;
use std::collections::HashMap;

/// Everything an adapter needs besides the turn itself
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub client: &'a reqwest::Client,
    pub vendor: Vendor,
    /// Model id with any `vendor/` routing prefix removed
    pub model_id: &'a str,
    /// Validated base URL without a trailing slash
    pub base_url: &'a str,
    pub request: &'a StreamRequest,
}

impl<'a> TurnContext<'a> {
    /// The API key, or a ConfigurationError naming the vendor
    pub fn api_key(&self) -> Result<&'a str, LlmError> {
        self.request
            .credentials
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::configuration(format!("{} requires an API key", self.vendor))
            })
    }

    /// Extra headers forwarded with every request
    pub fn extra_headers(&self) -> &'a HashMap<String, String> {
        &self.request.credentials.extra_headers
    }
}

/// Whether the adapter loop keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Per-protocol routing of decoded SSE events into a turn
pub trait SseHandler {
    /// Route one event
    fn handle(&mut self, event: &SseEvent, turn: &mut Turn<'_>) -> Result<Flow, LlmError>;

    /// Called once when the stream ends without error
    fn finish(&mut self, _turn: &mut Turn<'_>) -> Result<(), LlmError> {
        Ok(())
    }
}

/// Run one turn through the adapter for the vendor's protocol
pub async fn run(ctx: &TurnContext<'_>, turn: &mut Turn<'_>) -> Result<(), LlmError> {
    match ctx.vendor.protocol() {
        Protocol::AnthropicMessages => anthropic::stream(ctx, turn).await,
        Protocol::ChatCompletions => openai_chat::stream(ctx, turn).await,
        Protocol::Responses => openai_responses::stream(ctx, turn).await,
        Protocol::GenerateContent => gemini::stream(ctx, turn).await,
    }
}

/// Send a streaming request; non-success statuses become TransportErrors
pub async fn post_stream(
    vendor: Vendor,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, LlmError> {
    let response = request
        .header("Accept", "text/event-stream")
        .send()
        .await
        .map_err(|e| {
            tracing::error!("❌ {} streaming request failed: {}", vendor, e);
            LlmError::network(vendor, e)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!(
            "❌ {} streaming API error {}: {}",
            vendor,
            status,
            sanitize_for_logging(&error_text)
        );
        return Err(LlmError::http_status(vendor, status.as_u16(), error_text));
    }

    tracing::debug!("🌊 {} streaming response received, processing SSE stream...", vendor);
    Ok(response)
}

/// Attach caller-supplied headers to a request
pub fn with_extra_headers(
    mut builder: reqwest::RequestBuilder,
    headers: &HashMap<String, String>,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Decode the response body and feed every event to `handler`.
///
/// Chunks queued by each event are flushed to the sink before the next
/// event is read. The `[DONE]` sentinel ends the stream.
pub async fn drive<H: SseHandler>(
    vendor: Vendor,
    response: reqwest::Response,
    handler: &mut H,
    turn: &mut Turn<'_>,
) -> Result<(), LlmError> {
    let events = sse::events(vendor, response);
    futures::pin_mut!(events);
    let mut event_count = 0usize;

    while let Some(event) = events.next().await {
        let event = event?;
        if event.is_done_sentinel() {
            tracing::debug!("🌊 {} sent end-of-stream sentinel", vendor);
            break;
        }
        event_count += 1;
        let flow = handler.handle(&event, turn)?;
        turn.flush().await;
        if flow == Flow::Done {
            break;
        }
    }

    handler.finish(turn)?;
    turn.flush().await;
    tracing::debug!("🌊 {} stream processed {} events", vendor, event_count);
    Ok(())
}

/// Parse an event payload, mapping failures to a ProtocolError
pub fn parse_event<T: serde::de::DeserializeOwned>(
    vendor: Vendor,
    event: &SseEvent,
) -> Result<T, LlmError> {
    serde_json::from_str(&event.data).map_err(|e| {
        tracing::error!("❌ Failed to parse {} event '{}': {}", vendor, event.data, e);
        LlmError::protocol(vendor, format!("malformed event payload: {}", e))
    })
}

/// Encode every attachment of a message for `vendor`
pub async fn encode_attachments(
    attachments: &[Attachment],
    vendor: Vendor,
) -> Vec<EncodedAttachment> {
    let capabilities = vendor.capabilities();
    let mut encoded = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        encoded.push(encode(attachment, vendor, &capabilities).await);
    }
    encoded
}

/// Tool arguments serialized for vendors that carry them as a JSON string
pub fn arguments_string(arguments: &serde_json::Map<String, serde_json::Value>) -> String {
    serde_json::to_string(arguments).unwrap_or_else(|_| "{}".to_string())
}
