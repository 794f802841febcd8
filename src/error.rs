//! Error handling for the streaming adapter core.
//!
//! Turn failures fall into three categories:
//!
//! - **Configuration** - missing or invalid credential or base URL, raised
//!   before any network call
//! - **Transport** - the vendor could not be reached, or answered with a
//!   non-success HTTP status
//! - **Protocol** - the vendor's stream carried something the adapter could
//!   not interpret, or an in-band error event
//!
//! Malformed tool arguments are not errors here: they are captured on the
//! [`ToolCall`](crate::types::ToolCall) metadata and never abort a turn.
//!
//! Context-limit overflow is a classification rather than a variant. Callers
//! consult [`is_context_limit`] on the failure message after the fact.

use crate::llm::traits::Vendor;
use thiserror::Error;

/// Main error type for a streaming turn
#[derive(Error, Debug)]
pub enum LlmError {
    /// Missing or invalid credential, base URL, or model identifier
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Network or HTTP failure reaching the vendor
    #[error("{vendor} request failed: {message}")]
    TransportError {
        vendor: Vendor,
        status: Option<u16>,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The vendor stream emitted something uninterpretable
    #[error("{vendor} stream error: {message}")]
    ProtocolError { vendor: Vendor, message: String },
}

impl LlmError {
    /// Create a ConfigurationError
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a ProtocolError
    pub fn protocol(vendor: Vendor, message: impl Into<String>) -> Self {
        Self::ProtocolError {
            vendor,
            message: message.into(),
        }
    }

    /// Create a TransportError from a non-success HTTP response body
    pub fn http_status(vendor: Vendor, status: u16, body: impl Into<String>) -> Self {
        Self::TransportError {
            vendor,
            status: Some(status),
            message: format!("HTTP {}: {}", status, body.into()),
            source: None,
        }
    }

    /// Create a TransportError from a reqwest failure
    pub fn network(vendor: Vendor, error: reqwest::Error) -> Self {
        Self::TransportError {
            vendor,
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// HTTP status carried by a transport failure
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::TransportError { status, .. } => *status,
            _ => None,
        }
    }

    /// Vendor the failure came from, when known
    pub fn vendor(&self) -> Option<Vendor> {
        match self {
            LlmError::TransportError { vendor, .. } | LlmError::ProtocolError { vendor, .. } => {
                Some(*vendor)
            }
            LlmError::ConfigurationError { .. } => None,
        }
    }

    /// Short category name used in telemetry
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::ConfigurationError { .. } => ErrorKind::Configuration,
            LlmError::TransportError { .. } => ErrorKind::Transport,
            LlmError::ProtocolError { .. } => ErrorKind::Protocol,
        }
    }

    /// Check if this failure looks like a context-window overflow
    pub fn is_context_limit(&self) -> bool {
        match self.vendor() {
            Some(vendor) => is_context_limit(vendor, &self.to_string()),
            None => false,
        }
    }
}

/// Category of a turn failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Transport,
    Protocol,
}

/// The vendor-specific phrase that accompanies a "prompt too long" rejection.
///
/// A single substring per vendor, matched case-insensitively.
pub fn context_limit_marker(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Anthropic => "prompt is too long",
        Vendor::OpenAi => "context_length_exceeded",
        Vendor::DeepSeek
        | Vendor::OpenRouter
        | Vendor::Ollama
        | Vendor::LmStudio
        | Vendor::Groq
        | Vendor::Mistral => "maximum context length",
        Vendor::Gemini | Vendor::Vertex => "exceeds the maximum number of tokens",
    }
}

/// Classify a failure message as a context-limit overflow for `vendor`
pub fn is_context_limit(vendor: Vendor, message: &str) -> bool {
    message
        .to_lowercase()
        .contains(context_limit_marker(vendor))
}
