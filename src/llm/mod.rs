//! Streaming adapters that present every vendor through one event contract.
//!
//! A caller builds a [`StreamRequest`], hands it to a [`Dispatcher`] together
//! with a [`StreamSink`], and observes:
//!
//! - any number of `on_chunk` calls carrying answer text and inline
//!   `<think>` markup for reasoning
//! - exactly one terminal `on_complete(final_text, tool_calls)` or
//!   `on_error(message)`
//!
//! ```no_run
//! use braid::llm::{Dispatcher, ModelConfig, StreamRequest, VendorCredentials};
//! use braid::llm::sink::CollectingSink;
//! use braid::types::Message;
//!
//! # async fn demo() {
//! let dispatcher = Dispatcher::new();
//! let sink = CollectingSink::new();
//! let request = StreamRequest::new(
//!     ModelConfig::new("claude-sonnet-4-20250514"),
//!     vec![Message::user("Summarise the attached report")],
//! )
//! .with_credentials(VendorCredentials::api_key("sk-ant-..."));
//!
//! dispatcher.stream(request, &sink).await;
//! println!("{}", sink.snapshot().await.transcript());
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Dispatcher → providers::{anthropic | openai_chat | openai_responses | gemini}
//!                  ↓
//!             sse decoder → SseHandler → Turn (reasoning normalizer,
//!                                              marker escaper,
//!                                              tool-call accumulator) → sink
//! ```

pub mod accumulator;
pub mod arguments;
pub mod attachments;
pub mod dispatcher;
pub mod providers;
pub mod reasoning;
pub mod sink;
pub mod sse;
pub mod token_cache;
pub mod traits;
pub mod turn;

pub use dispatcher::Dispatcher;
pub use traits::{
    ModelConfig, Protocol, ReasoningEffort, StreamRequest, StreamSink, Vendor,
    VendorCapabilities, VendorCredentials,
};
