//! Incremental server-sent-events decoding.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences and JSON payloads split across HTTP chunks decode correctly.
//! A blank line dispatches the event collected so far.

use crate::error::LlmError;
use crate::llm::traits::Vendor;
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
}

impl SseEvent {
    /// Check for the OpenAI-style end-of-stream sentinel
    pub fn is_done_sentinel(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Line-oriented SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            let line = line.trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
            start = end + 1;
            self.scanned = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        events
    }

    /// Flush a trailing event not followed by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        tracing::trace!("🌊 Processing SSE line: '{}'", line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Decode a streaming HTTP response into SSE events
pub fn events(
    vendor: Vendor,
    response: reqwest::Response,
) -> impl Stream<Item = Result<SseEvent, LlmError>> {
    decode(vendor, response.bytes_stream())
}

/// Decode any stream of body chunks into SSE events
pub fn decode<S>(vendor: Vendor, chunks: S) -> impl Stream<Item = Result<SseEvent, LlmError>>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        let mut chunks = Box::pin(chunks);
        let mut chunk_count = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| LlmError::network(vendor, e))?;
            chunk_count += 1;
            tracing::trace!("🌊 Received HTTP chunk #{}: {} bytes", chunk_count, chunk.len());
            for event in decoder.push(&chunk) {
                yield event;
            }
        }

        if let Some(event) = decoder.finish() {
            yield event;
        }
        tracing::debug!("🌊 SSE stream completed after {} chunks", chunk_count);
    }
}
