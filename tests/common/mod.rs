//! Shared fixtures and assertions for the streaming integration tests.
#![allow(dead_code)]

use braid::llm::sink::Collected;
use regex::Regex;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Render events as an SSE body, naming each event after its `type` field
pub fn sse(events: &[Value]) -> String {
    let mut body = String::new();
    for event in events {
        if let Some(kind) = event["type"].as_str() {
            body.push_str(&format!("event: {}\n", kind));
        }
        body.push_str(&format!("data: {}\n\n", event));
    }
    body
}

/// Render chat-completion chunks followed by the `[DONE]` sentinel
pub fn sse_with_done(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Serve `body` for every POST to `route`
pub async fn mount_sse(server: &MockServer, route: &str, body: String) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(sse_response(body))
        .mount(server)
        .await;
}

/// JSON bodies of every request the server received
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap_or(Value::Null))
        .collect()
}

/// Exactly one terminal callback fired
pub fn assert_single_terminal(collected: &Collected) {
    assert_eq!(
        collected.terminal_count(),
        1,
        "expected one terminal callback, got completions={} errors={:?}",
        collected.completions,
        collected.errors
    );
}

/// Every `<think>` has a matching close carrying a positive whole-second annotation
pub fn assert_spans_balanced(transcript: &str) {
    let opens = transcript.matches("<think>").count();
    let closes = transcript.matches("</think>").count();
    assert_eq!(opens, closes, "unbalanced reasoning spans in {:?}", transcript);

    let meta = Regex::new(r#"</think><think-meta seconds="(\d+)"/>"#).unwrap();
    let annotated: Vec<u64> = meta
        .captures_iter(transcript)
        .map(|caps| caps[1].parse().unwrap())
        .collect();
    assert_eq!(annotated.len(), closes, "close without annotation in {:?}", transcript);
    assert!(annotated.iter().all(|seconds| *seconds >= 1));
}
