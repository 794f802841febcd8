//! Single entry point for running a turn against any vendor.
//!
//! The dispatcher resolves which [`Vendor`] a request targets, validates the
//! endpoint, drives the protocol adapter, and converts the outcome into
//! exactly one terminal sink callback. Failures are also reported to the
//! configured [`TelemetryCollector`].

use crate::config::{BraidConfig, ConfigError};
use crate::error::LlmError;
use crate::llm::providers::{self, TurnContext};
use crate::llm::traits::{StreamRequest, StreamSink, Vendor, VendorCredentials};
use crate::llm::turn::Turn;
use crate::telemetry::{TelemetryCollector, TracingTelemetry, TurnFailure};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Routes turns to vendor adapters
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    telemetry: Arc<dyn TelemetryCollector>,
    /// Fallback credentials used when a request carries none
    defaults: HashMap<Vendor, VendorCredentials>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            telemetry: Arc::new(TracingTelemetry),
            defaults: HashMap::new(),
        }
    }

    /// Replace the failure collector
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryCollector>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Credentials applied to requests for `vendor` that carry none of their own
    pub fn with_default_credentials(mut self, vendor: Vendor, credentials: VendorCredentials) -> Self {
        self.defaults.insert(vendor, credentials);
        self
    }

    /// Build a dispatcher whose HTTP client and fallback credentials come
    /// from configuration
    pub fn from_config(config: &BraidConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut dispatcher = Self::with_client(config.http.build_client()?);
        for vendor in config.vendors.keys() {
            dispatcher
                .defaults
                .insert(*vendor, config.credentials_for(*vendor)?);
        }
        Ok(dispatcher)
    }

    /// Run one turn, reporting every event to `sink`.
    ///
    /// Exactly one of `on_complete` or `on_error` is invoked, after every
    /// chunk and after any open reasoning span has been closed.
    pub async fn stream(&self, mut request: StreamRequest, sink: &dyn StreamSink) {
        let turn_id = Uuid::new_v4();
        let started = Instant::now();
        let mut vendor = None;

        let result = match resolve_vendor(&request.model.model_id, request.vendor) {
            Ok((resolved, model_id)) => {
                vendor = Some(resolved);
                let model_id = model_id.to_string();
                if let Some(defaults) = self.defaults.get(&resolved) {
                    let explicit = std::mem::take(&mut request.credentials);
                    request.credentials = explicit.layered_over(defaults);
                }
                info!(
                    turn_id = %turn_id,
                    vendor = resolved.as_str(),
                    model = %model_id,
                    messages = request.conversation.len(),
                    tools = request.tools.len(),
                    "🌊 Starting turn"
                );
                let mut turn = Turn::new(sink, request.model.show_reasoning, &request.tools);
                let outcome = self
                    .run_turn(resolved, &model_id, &request, &mut turn)
                    .await;
                turn.close();
                turn.flush().await;
                outcome.map(|_| turn.into_outcome())
            }
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed();
        match result {
            Ok((final_text, tool_calls)) => {
                info!(
                    turn_id = %turn_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    text_chars = final_text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
                    tool_calls = tool_calls.len(),
                    "✅ Turn complete"
                );
                sink.on_complete(final_text, tool_calls).await;
            }
            Err(error) => {
                self.telemetry.record_failure(TurnFailure::from_error(
                    turn_id,
                    vendor,
                    request.model.model_id.clone(),
                    &error,
                    elapsed,
                ));
                sink.on_error(&error.to_string()).await;
            }
        }
    }

    async fn run_turn(
        &self,
        vendor: Vendor,
        model_id: &str,
        request: &StreamRequest,
        turn: &mut Turn<'_>,
    ) -> Result<(), LlmError> {
        if vendor.requires_api_key()
            && request
                .credentials
                .api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(LlmError::configuration(format!(
                "{} requires an API key",
                vendor
            )));
        }

        let base_url = resolve_base_url(vendor, request.credentials.base_url.as_deref())?;
        debug!("🔧 {} endpoint {}", vendor, base_url);

        let ctx = TurnContext {
            client: &self.client,
            vendor,
            model_id,
            base_url: &base_url,
            request,
        };
        providers::run(&ctx, turn).await
    }
}

/// Work out the vendor for a model id.
///
/// An explicit vendor wins. Otherwise a `vendor/` prefix selects the vendor,
/// and failing that the model family name is recognised. Returns the model id
/// with any routing prefix for the chosen vendor removed.
pub fn resolve_vendor(model_id: &str, explicit: Option<Vendor>) -> Result<(Vendor, &str), LlmError> {
    let prefixed = model_id
        .split_once('/')
        .and_then(|(prefix, rest)| Vendor::from_name(prefix).map(|v| (v, rest)));

    if let Some(vendor) = explicit {
        return Ok(match prefixed {
            Some((prefix_vendor, rest)) if prefix_vendor == vendor => (vendor, rest),
            _ => (vendor, model_id),
        });
    }

    if let Some((vendor, rest)) = prefixed {
        return Ok((vendor, rest));
    }

    infer_vendor(model_id)
        .map(|vendor| (vendor, model_id))
        .ok_or_else(|| {
            LlmError::configuration(format!(
                "cannot determine vendor for model '{}'; set the vendor explicitly",
                model_id
            ))
        })
}

fn infer_vendor(model_id: &str) -> Option<Vendor> {
    let id = model_id.to_lowercase();
    if id.starts_with("claude") {
        Some(Vendor::Anthropic)
    } else if id.starts_with("gpt-")
        || id.starts_with("chatgpt")
        || ["o1", "o3", "o4"].iter().any(|p| id.starts_with(p))
    {
        Some(Vendor::OpenAi)
    } else if id.starts_with("gemini") {
        Some(Vendor::Gemini)
    } else if id.starts_with("deepseek") {
        Some(Vendor::DeepSeek)
    } else if ["mistral", "codestral", "magistral", "devstral"]
        .iter()
        .any(|p| id.starts_with(p))
    {
        Some(Vendor::Mistral)
    } else {
        None
    }
}

/// The override or default base URL, validated and without a trailing slash
pub fn resolve_base_url(vendor: Vendor, override_url: Option<&str>) -> Result<String, LlmError> {
    let raw = override_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| vendor.default_base_url());
    let parsed = url::Url::parse(raw).map_err(|e| {
        LlmError::configuration(format!("invalid {} base URL '{}': {}", vendor, raw, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LlmError::configuration(format!(
            "invalid {} base URL '{}': scheme must be http or https",
            vendor, raw
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
