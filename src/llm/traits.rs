//! Core traits and request types for the streaming adapter layer.
//!
//! A turn is described by a [`StreamRequest`] and observed through a
//! [`StreamSink`]. Vendors form a closed set ([`Vendor`]), each speaking one
//! wire [`Protocol`].

use crate::types::{Conversation, Tool, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported LLM vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Responses API
    OpenAi,
    /// DeepSeek chat completions
    DeepSeek,
    /// OpenRouter chat completions
    OpenRouter,
    /// Local Ollama, OpenAI-compatible endpoint
    Ollama,
    /// Local LM Studio, OpenAI-compatible endpoint
    LmStudio,
    /// Groq chat completions
    Groq,
    /// Mistral chat completions
    Mistral,
    /// Google Gemini API with an API key
    Gemini,
    /// Google Vertex AI with a service account
    Vertex,
}

/// Wire protocol family spoken by a vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// content_block_start / delta / stop events
    AnthropicMessages,
    /// Delta-only chat completion chunks
    ChatCompletions,
    /// Single union-typed event stream
    Responses,
    /// streamGenerateContent candidates
    GenerateContent,
}

impl Vendor {
    /// Every supported vendor
    pub const ALL: [Vendor; 10] = [
        Vendor::Anthropic,
        Vendor::OpenAi,
        Vendor::DeepSeek,
        Vendor::OpenRouter,
        Vendor::Ollama,
        Vendor::LmStudio,
        Vendor::Groq,
        Vendor::Mistral,
        Vendor::Gemini,
        Vendor::Vertex,
    ];

    /// Get string representation of the vendor
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Anthropic => "anthropic",
            Vendor::OpenAi => "openai",
            Vendor::DeepSeek => "deepseek",
            Vendor::OpenRouter => "openrouter",
            Vendor::Ollama => "ollama",
            Vendor::LmStudio => "lmstudio",
            Vendor::Groq => "groq",
            Vendor::Mistral => "mistral",
            Vendor::Gemini => "gemini",
            Vendor::Vertex => "vertex",
        }
    }

    /// Parse a vendor name as used in model prefixes and configuration keys
    pub fn from_name(name: &str) -> Option<Vendor> {
        let name = name.trim().to_lowercase();
        Vendor::ALL.into_iter().find(|v| v.as_str() == name)
    }

    /// Wire protocol this vendor speaks
    pub fn protocol(&self) -> Protocol {
        match self {
            Vendor::Anthropic => Protocol::AnthropicMessages,
            Vendor::OpenAi => Protocol::Responses,
            Vendor::Gemini | Vendor::Vertex => Protocol::GenerateContent,
            Vendor::DeepSeek
            | Vendor::OpenRouter
            | Vendor::Ollama
            | Vendor::LmStudio
            | Vendor::Groq
            | Vendor::Mistral => Protocol::ChatCompletions,
        }
    }

    /// Base URL used when the caller does not override it
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Vendor::Anthropic => "https://api.anthropic.com",
            Vendor::OpenAi => "https://api.openai.com/v1",
            Vendor::DeepSeek => "https://api.deepseek.com/v1",
            Vendor::OpenRouter => "https://openrouter.ai/api/v1",
            Vendor::Ollama => "http://localhost:11434/v1",
            Vendor::LmStudio => "http://localhost:1234/v1",
            Vendor::Groq => "https://api.groq.com/openai/v1",
            Vendor::Mistral => "https://api.mistral.ai/v1",
            Vendor::Gemini => "https://generativelanguage.googleapis.com",
            // Vertex hosts are regional; see the gemini adapter
            Vendor::Vertex => "https://aiplatform.googleapis.com",
        }
    }

    /// Whether an API key is mandatory
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Vendor::Ollama | Vendor::LmStudio | Vendor::Vertex)
    }

    /// Environment variable conventionally holding this vendor's API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Vendor::Anthropic => Some("ANTHROPIC_API_KEY"),
            Vendor::OpenAi => Some("OPENAI_API_KEY"),
            Vendor::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Vendor::OpenRouter => Some("OPENROUTER_API_KEY"),
            Vendor::Groq => Some("GROQ_API_KEY"),
            Vendor::Mistral => Some("MISTRAL_API_KEY"),
            Vendor::Gemini => Some("GEMINI_API_KEY"),
            Vendor::Ollama | Vendor::LmStudio | Vendor::Vertex => None,
        }
    }

    /// Attachment kinds this vendor accepts
    pub fn capabilities(&self) -> VendorCapabilities {
        match self {
            Vendor::Anthropic => VendorCapabilities {
                images: true,
                pdfs: true,
                cache_boundary: true,
                reasoning_effort: true,
            },
            Vendor::OpenAi | Vendor::Gemini | Vendor::Vertex => VendorCapabilities {
                images: true,
                pdfs: true,
                cache_boundary: false,
                reasoning_effort: true,
            },
            Vendor::OpenRouter => VendorCapabilities {
                images: true,
                pdfs: false,
                cache_boundary: false,
                reasoning_effort: true,
            },
            Vendor::Ollama | Vendor::LmStudio | Vendor::Mistral => VendorCapabilities {
                images: true,
                pdfs: false,
                cache_boundary: false,
                reasoning_effort: false,
            },
            Vendor::Groq => VendorCapabilities {
                reasoning_effort: true,
                ..VendorCapabilities::text_only()
            },
            Vendor::DeepSeek => VendorCapabilities::text_only(),
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a vendor can accept besides text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VendorCapabilities {
    pub images: bool,
    pub pdfs: bool,
    /// Supports the prompt cache-boundary annotation
    pub cache_boundary: bool,
    /// Takes an effort hint, natively or mapped onto a thinking budget
    pub reasoning_effort: bool,
}

impl VendorCapabilities {
    /// Capabilities of a vendor that only takes text
    pub fn text_only() -> Self {
        Self::default()
    }
}

/// Reasoning effort hint for vendors that take one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Token budget used when a vendor wants a budget but only an effort was given
    pub fn default_budget(&self) -> u32 {
        match self {
            ReasoningEffort::Low => 2048,
            ReasoningEffort::Medium => 8192,
            ReasoningEffort::High => 16384,
        }
    }
}

/// Model configuration for one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier, optionally prefixed with `vendor/`
    pub model_id: String,
    /// System prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Whether reasoning content is shown to the user
    #[serde(default)]
    pub show_reasoning: bool,
    /// Reasoning effort knob
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Thinking-token budget knob
    #[serde(default)]
    pub thinking_budget: Option<u32>,
    /// Maximum tokens in the model response
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Temperature for model responses
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ModelConfig {
    /// Create a configuration for a model id with defaults elsewhere
    pub fn new<S: Into<String>>(model_id: S) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Check if any reasoning knob was set
    pub fn wants_reasoning(&self) -> bool {
        self.reasoning_effort.is_some() || self.thinking_budget.is_some()
    }
}

/// Credentials and endpoint overrides for one vendor
#[derive(Clone, Default)]
pub struct VendorCredentials {
    /// API key or bearer token
    pub api_key: Option<String>,
    /// Service account JSON for signed-assertion token exchange
    pub service_account: Option<String>,
    /// Override base URL
    pub base_url: Option<String>,
    /// Region for regional endpoints
    pub region: Option<String>,
    /// Additional headers forwarded verbatim
    pub extra_headers: HashMap<String, String>,
}

impl VendorCredentials {
    /// Credentials holding only an API key
    pub fn api_key<S: Into<String>>(key: S) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Override the base URL
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a header forwarded with every request
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Fill unset fields from `defaults`.
    ///
    /// Fields set here win; headers are merged with these taking precedence
    /// on a name clash.
    pub fn layered_over(self, defaults: &VendorCredentials) -> Self {
        let mut extra_headers = defaults.extra_headers.clone();
        extra_headers.extend(self.extra_headers);
        Self {
            api_key: self.api_key.or_else(|| defaults.api_key.clone()),
            service_account: self
                .service_account
                .or_else(|| defaults.service_account.clone()),
            base_url: self.base_url.or_else(|| defaults.base_url.clone()),
            region: self.region.or_else(|| defaults.region.clone()),
            extra_headers,
        }
    }
}

impl std::fmt::Debug for VendorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::utils::logging::obscure_credential;
        f.debug_struct("VendorCredentials")
            .field("api_key", &self.api_key.as_deref().map(obscure_credential))
            .field(
                "service_account",
                &self.service_account.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .field(
                "extra_headers",
                &self.extra_headers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Everything needed to run one turn
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Model configuration
    pub model: ModelConfig,
    /// Explicit vendor; inferred from the model id when absent
    pub vendor: Option<Vendor>,
    /// Conversation so far
    pub conversation: Conversation,
    /// Tools the caller offers
    pub tools: Vec<Tool>,
    /// Credentials for the vendor
    pub credentials: VendorCredentials,
}

impl StreamRequest {
    /// Create a request for a model and conversation
    pub fn new(model: ModelConfig, conversation: Conversation) -> Self {
        Self {
            model,
            vendor: None,
            conversation,
            tools: Vec::new(),
            credentials: VendorCredentials::default(),
        }
    }

    pub fn with_vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_credentials(mut self, credentials: VendorCredentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Receiver of the uniform event sequence of a turn.
///
/// `on_chunk` may fire any number of times and each call appends to the
/// running transcript, including inline reasoning markup. Exactly one of
/// `on_complete` or `on_error` fires, exactly once, after the last chunk.
/// All methods default to no-ops.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Handle an incremental text chunk
    async fn on_chunk(&self, _chunk: &str) {}

    /// Handle successful completion of the turn
    async fn on_complete(&self, _final_text: Option<String>, _tool_calls: Vec<ToolCall>) {}

    /// Handle failure of the turn
    async fn on_error(&self, _message: &str) {}
}
