//! Ready-made [`StreamSink`] implementations.

use crate::llm::traits::StreamSink;
use crate::types::ToolCall;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl StreamSink for NullSink {}

/// Everything a [`CollectingSink`] observed
#[derive(Debug, Default, Clone)]
pub struct Collected {
    pub chunks: Vec<String>,
    pub final_text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub completions: usize,
    pub errors: Vec<String>,
}

impl Collected {
    /// Running transcript: every chunk concatenated
    pub fn transcript(&self) -> String {
        self.chunks.concat()
    }

    /// Number of terminal callbacks received
    pub fn terminal_count(&self) -> usize {
        self.completions + self.errors.len()
    }
}

/// Sink that records every callback in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    inner: Mutex<Collected>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of what has been received so far
    pub async fn snapshot(&self) -> Collected {
        self.inner.lock().await.clone()
    }
}

#[async_trait]
impl StreamSink for CollectingSink {
    async fn on_chunk(&self, chunk: &str) {
        self.inner.lock().await.chunks.push(chunk.to_string());
    }

    async fn on_complete(&self, final_text: Option<String>, tool_calls: Vec<ToolCall>) {
        let mut inner = self.inner.lock().await;
        inner.final_text = final_text;
        inner.tool_calls = tool_calls;
        inner.completions += 1;
    }

    async fn on_error(&self, message: &str) {
        self.inner.lock().await.errors.push(message.to_string());
    }
}

/// Event forwarded by a [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Chunk(String),
    Complete {
        final_text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Error(String),
}

/// Sink forwarding callbacks over an unbounded channel.
///
/// Send failures (receiver dropped) are ignored; the turn keeps running.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn on_chunk(&self, chunk: &str) {
        let _ = self.sender.send(SinkEvent::Chunk(chunk.to_string()));
    }

    async fn on_complete(&self, final_text: Option<String>, tool_calls: Vec<ToolCall>) {
        let _ = self.sender.send(SinkEvent::Complete {
            final_text,
            tool_calls,
        });
    }

    async fn on_error(&self, message: &str) {
        let _ = self.sender.send(SinkEvent::Error(message.to_string()));
    }
}
