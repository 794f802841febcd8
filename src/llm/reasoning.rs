//! Reasoning normalizer: vendor "thinking" signals to inline neutral markup.
//!
//! A reasoning span is rendered inside the ordinary chunk stream as
//!
//! ```text
//! <think>raw reasoning text</think><think-meta seconds="3"/>
//! ```
//!
//! The closing marker and the elapsed-time annotation always travel in one
//! chunk. Renderers find and strip the markup even when it straddles chunks,
//! so literal markers appearing in ordinary answer text are escaped by
//! [`MarkerEscaper`] before emission.

use std::time::Instant;

/// Opening marker of a reasoning span
pub const THINK_OPEN: &str = "<think>";
/// Closing marker of a reasoning span
pub const THINK_CLOSE: &str = "</think>";
/// Prefix of the elapsed-time annotation
pub const THINK_META_PREFIX: &str = "<think-meta";
/// Placeholder emitted once per span for opaque, redacted reasoning
pub const REDACTED_PLACEHOLDER: &str = "[reasoning redacted by provider]";

/// The closing chunk: close marker plus elapsed-seconds annotation
pub fn closing_chunk(seconds: u64) -> String {
    format!("{}{} seconds=\"{}\"/>", THINK_CLOSE, THINK_META_PREFIX, seconds)
}

/// Identity of the reasoning channel a signal arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasoningChannel {
    /// Vendors reporting one no-index reasoning stream
    Single,
    /// Vendors reporting several channels keyed by content-block index
    Indexed(usize),
}

#[derive(Debug)]
enum SpanState {
    Idle,
    Thinking {
        channel: ReasoningChannel,
        started_at: Instant,
        redacted_emitted: bool,
    },
}

/// State machine re-emitting vendor reasoning as neutral markup.
///
/// Every method returns the chunks to emit, in order. When `show` is false
/// span transitions are still tracked but nothing is emitted.
#[derive(Debug)]
pub struct ReasoningNormalizer {
    show: bool,
    state: SpanState,
}

impl ReasoningNormalizer {
    pub fn new(show: bool) -> Self {
        Self {
            show,
            state: SpanState::Idle,
        }
    }

    /// Check if a span is currently open
    pub fn is_thinking(&self) -> bool {
        matches!(self.state, SpanState::Thinking { .. })
    }

    /// Open a span on `channel` if one is not already open there.
    ///
    /// A span open on another channel is closed first.
    pub fn open(&mut self, channel: ReasoningChannel) -> Vec<String> {
        let mut chunks = Vec::new();
        if let SpanState::Thinking { channel: current, .. } = &self.state {
            if *current == channel {
                return chunks;
            }
            chunks.extend(self.close());
        }
        tracing::trace!("💭 Reasoning span opened on {:?}", channel);
        self.state = SpanState::Thinking {
            channel,
            started_at: Instant::now(),
            redacted_emitted: false,
        };
        if self.show {
            chunks.push(THINK_OPEN.to_string());
        }
        chunks
    }

    /// Append a reasoning delta, opening a span if needed
    pub fn delta(&mut self, channel: ReasoningChannel, text: &str) -> Vec<String> {
        let mut chunks = self.open(channel);
        if self.show && !text.is_empty() {
            chunks.push(text.to_string());
        }
        chunks
    }

    /// Record redacted reasoning; the placeholder appears once per span
    pub fn redacted(&mut self, channel: ReasoningChannel) -> Vec<String> {
        let mut chunks = self.open(channel);
        if let SpanState::Thinking {
            redacted_emitted, ..
        } = &mut self.state
        {
            if !*redacted_emitted {
                *redacted_emitted = true;
                if self.show {
                    chunks.push(REDACTED_PLACEHOLDER.to_string());
                }
            }
        }
        chunks
    }

    /// Close the open span, if any.
    ///
    /// Used for explicit end-of-span signals, for the first ordinary-text
    /// delta, and at turn end.
    pub fn close(&mut self) -> Vec<String> {
        self.close_at(Instant::now())
    }

    fn close_at(&mut self, now: Instant) -> Vec<String> {
        match std::mem::replace(&mut self.state, SpanState::Idle) {
            SpanState::Idle => Vec::new(),
            SpanState::Thinking { started_at, .. } => {
                let seconds = elapsed_seconds(started_at, now);
                tracing::trace!("💭 Reasoning span closed after {}s", seconds);
                if self.show {
                    vec![closing_chunk(seconds)]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Whole seconds between `start` and `end`, rounded up, at least one
fn elapsed_seconds(start: Instant, end: Instant) -> u64 {
    let elapsed = end.saturating_duration_since(start).as_secs_f64();
    (elapsed.ceil() as u64).max(1)
}

const MARKERS: [&str; 3] = [THINK_OPEN, THINK_CLOSE, THINK_META_PREFIX];

/// Escape every literal marker occurrence in ordinary text
pub fn escape_markers(text: &str) -> String {
    let mut out = text.to_string();
    for marker in MARKERS {
        if out.contains(marker) {
            out = out.replace(marker, &format!("&lt;{}", &marker[1..]));
        }
    }
    out
}

/// Byte length of the longest suffix that is a proper prefix of a marker
fn partial_marker_suffix(text: &str) -> usize {
    let longest = MARKERS.iter().map(|m| m.len()).max().unwrap_or(0);
    for len in (1..longest).rev() {
        if len > text.len() || !text.is_char_boundary(text.len() - len) {
            continue;
        }
        let suffix = &text[text.len() - len..];
        if MARKERS
            .iter()
            .any(|m| m.len() > len && m.starts_with(suffix))
        {
            return len;
        }
    }
    0
}

/// Escapes literal markers in ordinary text across delta boundaries.
///
/// A trailing fragment that could begin a marker is held back until the next
/// delta disambiguates it, or until [`MarkerEscaper::flush`].
#[derive(Debug, Default)]
pub struct MarkerEscaper {
    pending: String,
}

impl MarkerEscaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta; returns the escaped text that is safe to emit now
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.pending.push_str(delta);
        let hold = partial_marker_suffix(&self.pending);
        let ready_len = self.pending.len() - hold;
        if ready_len == 0 {
            return None;
        }
        let rest = self.pending.split_off(ready_len);
        let ready = std::mem::replace(&mut self.pending, rest);
        Some(escape_markers(&ready))
    }

    /// Emit whatever is held back
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(escape_markers(&rest))
    }
}
