//! Per-invocation turn state shared by all adapters.
//!
//! Adapters route vendor events into a [`Turn`]; the turn owns the reasoning
//! normalizer, the marker escaper, and the tool-call accumulator for exactly
//! one `stream()` call. Nothing here is shared between turns.
//!
//! Event handlers are synchronous and queue chunks; the adapter loop calls
//! [`Turn::flush`] after each vendor event to hand them to the sink.

use crate::llm::accumulator::{CallKey, ToolCallAccumulator};
use crate::llm::reasoning::{MarkerEscaper, ReasoningChannel, ReasoningNormalizer};
use crate::llm::traits::StreamSink;
use crate::types::{Tool, ToolCall};

pub struct Turn<'a> {
    sink: &'a dyn StreamSink,
    reasoning: ReasoningNormalizer,
    escaper: MarkerEscaper,
    calls: ToolCallAccumulator,
    declared: Vec<Tool>,
    text: String,
    pending: Vec<String>,
    closed: bool,
}

impl<'a> Turn<'a> {
    pub fn new(sink: &'a dyn StreamSink, show_reasoning: bool, declared: &[Tool]) -> Self {
        Self {
            sink,
            reasoning: ReasoningNormalizer::new(show_reasoning),
            escaper: MarkerEscaper::new(),
            calls: ToolCallAccumulator::new(),
            declared: declared.to_vec(),
            text: String::new(),
            pending: Vec::new(),
            closed: false,
        }
    }

    /// Ordinary answer text; closes any open reasoning span first
    pub fn text(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        let closing = self.reasoning.close();
        self.flush_escaper_into_pending_if(!closing.is_empty());
        self.pending.extend(closing);
        if let Some(escaped) = self.escaper.push(delta) {
            self.emit_text(escaped);
        }
    }

    /// Start of a reasoning span without content yet
    pub fn begin_reasoning(&mut self, channel: ReasoningChannel) {
        self.flush_escaper_into_pending_if(!self.reasoning.is_thinking());
        let chunks = self.reasoning.open(channel);
        self.pending.extend(chunks);
    }

    /// Reasoning delta on a channel
    pub fn reasoning(&mut self, channel: ReasoningChannel, delta: &str) {
        self.flush_escaper_into_pending_if(!self.reasoning.is_thinking());
        let chunks = self.reasoning.delta(channel, delta);
        self.pending.extend(chunks);
    }

    /// Redacted reasoning on a channel
    pub fn redacted(&mut self, channel: ReasoningChannel) {
        self.flush_escaper_into_pending_if(!self.reasoning.is_thinking());
        let chunks = self.reasoning.redacted(channel);
        self.pending.extend(chunks);
    }

    /// Explicit end of the current reasoning span
    pub fn end_reasoning(&mut self) {
        let chunks = self.reasoning.close();
        self.pending.extend(chunks);
    }

    /// Tool-call accumulator for this turn
    pub fn calls(&mut self) -> &mut ToolCallAccumulator {
        &mut self.calls
    }

    /// Shortcut for opening a call
    pub fn open_call(&mut self, key: CallKey, id: Option<String>, name: impl Into<String>) {
        self.calls.open(key, id, name);
    }

    /// End of the vendor stream: close spans and release held-back text
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(rest) = self.escaper.flush() {
            self.emit_text(rest);
        }
        let chunks = self.reasoning.close();
        self.pending.extend(chunks);
    }

    /// Chunks queued since the last drain
    pub fn drain_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    /// Deliver queued chunks to the sink in order
    pub async fn flush(&mut self) {
        for chunk in self.drain_pending() {
            self.sink.on_chunk(&chunk).await;
        }
    }

    /// Visible answer text and finished tool calls
    pub fn into_outcome(mut self) -> (Option<String>, Vec<ToolCall>) {
        self.close();
        let text = (!self.text.is_empty()).then_some(self.text);
        let calls = self.calls.finish(&self.declared);
        (text, calls)
    }

    fn emit_text(&mut self, escaped: String) {
        self.text.push_str(&escaped);
        self.pending.push(escaped);
    }

    // Text held back by the escaper must precede markup that follows it
    fn flush_escaper_into_pending_if(&mut self, condition: bool) {
        if condition {
            if let Some(rest) = self.escaper.flush() {
                self.emit_text(rest);
            }
        }
    }
}
