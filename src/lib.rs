//! Talk to many LLM vendors through one streaming contract.
//!
//! Braid translates a vendor-neutral conversation into each vendor's request
//! format, consumes that vendor's streaming response, and re-emits a uniform
//! event sequence: incremental text, inline reasoning markup, finished tool
//! calls, and a single terminal success or failure.
//!
//! # Quick Start
//!
//! ```no_run
//! use braid::config::BraidConfig;
//! use braid::llm::sink::ChannelSink;
//! use braid::llm::{Dispatcher, ModelConfig, StreamRequest};
//! use braid::types::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BraidConfig::from_env()?;
//!     let _logging = braid::telemetry::init_logging(&config.logging)?;
//!     let dispatcher = Dispatcher::from_config(&config)?;
//!
//!     let mut model = ModelConfig::new("gemini-2.5-flash");
//!     model.show_reasoning = true;
//!     let request = StreamRequest::new(model, vec![Message::user("Why is the sky blue?")]);
//!
//!     let (sink, mut events) = ChannelSink::new();
//!     let turn = tokio::spawn(async move { dispatcher.stream(request, &sink).await });
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     turn.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Inline reasoning markup
//!
//! Reasoning appears in the chunk stream wrapped as
//! `<think>…</think><think-meta seconds="N"/>`. Literal markers in answer
//! text are escaped so they never open a span.
//!
//! # Key Types
//!
//! - [`llm::Dispatcher`] - resolves the vendor and runs a turn
//! - [`llm::StreamRequest`] - model, conversation, tools, credentials
//! - [`llm::StreamSink`] - receiver of the uniform event sequence
//! - [`types::Message`] - canonical conversation messages
//! - [`LlmError`] - configuration, transport and protocol failures

pub mod config;
pub mod error;
pub mod llm;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use error::LlmError;
pub use types::*;

pub type Result<T> = std::result::Result<T, LlmError>;
