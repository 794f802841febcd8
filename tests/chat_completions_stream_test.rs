//! OpenAI-compatible chat completion streams against a mock server

mod common;

use braid::llm::sink::CollectingSink;
use braid::llm::{Dispatcher, ModelConfig, ReasoningEffort, StreamRequest, Vendor, VendorCredentials};
use braid::types::{Message, Tool};
use common::{
    assert_single_terminal, assert_spans_balanced, mount_sse, request_bodies, sse_response,
    sse_with_done,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "read_file",
            "Read a file from the workspace",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        ),
        Tool::new(
            "list_dir",
            "List a directory",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        ),
    ]
}

fn delta(delta: serde_json::Value) -> serde_json::Value {
    json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "choices": [{"index": 0, "delta": delta, "finish_reason": null}]})
}

#[tokio::test]
async fn test_reasoning_content_and_indexed_tool_calls() {
    let server = MockServer::start().await;
    let body = sse_with_done(&[
        delta(json!({"role": "assistant", "reasoning_content": "The user wants "})),
        delta(json!({"reasoning_content": "two files."})),
        delta(json!({"content": "Reading both."})),
        delta(json!({"tool_calls": [{"index": 0, "id": "call_a", "type": "function", "function": {"name": "read_file", "arguments": ""}}]})),
        delta(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"path\": "}}]})),
        delta(json!({"tool_calls": [{"index": 1, "id": "call_b", "type": "function", "function": {"name": "list_dir", "arguments": "{\"path\": \"src\"}"}}]})),
        delta(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"Cargo.toml\"}"}}]})),
        delta(json!({"tool_calls": [{"index": 2, "id": "call_c", "type": "function", "function": {"name": "delete_everything", "arguments": "{}"}}]})),
        json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        json!({"id": "chatcmpl-1", "choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 40}}),
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer ds-key"))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let mut model = ModelConfig::new("deepseek-reasoner");
    model.show_reasoning = true;
    model.system_prompt = Some("You are a careful assistant.".to_string());
    let request = StreamRequest::new(model, vec![Message::user("show me Cargo.toml and src")])
        .with_tools(tools())
        .with_credentials(VendorCredentials::api_key("ds-key").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert_eq!(collected.completions, 1);
    assert_eq!(collected.chunks[0], "<think>");
    assert!(collected
        .transcript()
        .starts_with("<think>The user wants two files.</think><think-meta seconds=\""));
    assert_spans_balanced(&collected.transcript());
    assert_eq!(collected.final_text.as_deref(), Some("Reading both."));

    let calls = &collected.tool_calls;
    assert_eq!(calls.len(), 2, "undeclared tool must be dropped: {:?}", calls);
    let read = calls.iter().find(|c| c.name == "read_file").unwrap();
    assert_eq!(read.id, "call_a");
    assert_eq!(read.arguments.get("path"), Some(&json!("Cargo.toml")));
    let list = calls.iter().find(|c| c.name == "list_dir").unwrap();
    assert_eq!(list.id, "call_b");
    assert_eq!(list.arguments.get("path"), Some(&json!("src")));

    let sent = &request_bodies(&server).await[0];
    assert_eq!(sent["model"], json!("deepseek-reasoner"));
    assert_eq!(sent["messages"][0]["role"], json!("system"));
    assert_eq!(sent["stream_options"], json!({"include_usage": true}));
}

#[tokio::test]
async fn test_stream_options_rejection_retries_once_without_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Unrecognized request argument supplied: stream_options", "type": "invalid_request_error"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_sse(
        &server,
        "/chat/completions",
        sse_with_done(&[delta(json!({"content": "pong"}))]),
    )
    .await;

    let request = StreamRequest::new(ModelConfig::new("mixtral-8x7b-32768"), vec![Message::user("ping")])
        .with_vendor(Vendor::Groq)
        .with_credentials(VendorCredentials::api_key("gsk-key").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert_eq!(collected.final_text.as_deref(), Some("pong"));

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].get("stream_options").is_some());
    assert!(bodies[1].get("stream_options").is_none());
}

#[tokio::test]
async fn test_second_rejection_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            "stream_options is not supported and neither is this model",
        ))
        .mount(&server)
        .await;

    let request = StreamRequest::new(ModelConfig::new("mistral-large-latest"), vec![Message::user("hi")])
        .with_credentials(VendorCredentials::api_key("m-key").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert!(collected.errors[0].contains("400"));
    assert_eq!(request_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn test_local_vendor_needs_no_key() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        "/chat/completions",
        sse_with_done(&[
            delta(json!({"reasoning": "quick check"})),
            delta(json!({"content": "Hello from llama"})),
        ]),
    )
    .await;

    let mut model = ModelConfig::new("llama3.1:8b");
    model.show_reasoning = false;
    let request = StreamRequest::new(model, vec![Message::user("hello")])
        .with_vendor(Vendor::Ollama)
        .with_credentials(VendorCredentials::default().with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert_eq!(collected.transcript(), "Hello from llama");

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_malformed_arguments_are_captured_not_fatal() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        "/chat/completions",
        sse_with_done(&[
            delta(json!({"tool_calls": [{"index": 0, "id": "call_x", "function": {"name": "read_file", "arguments": "not json at all"}}]})),
        ]),
    )
    .await;

    let request = StreamRequest::new(ModelConfig::new("deepseek-chat"), vec![Message::user("go")])
        .with_tools(tools())
        .with_credentials(VendorCredentials::api_key("ds-key").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_eq!(collected.completions, 1);
    let call = &collected.tool_calls[0];
    assert!(call.arguments.is_empty());
    assert!(!call.parse_error().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_in_band_error_chunk_fails_turn() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        "/chat/completions",
        sse_with_done(&[
            delta(json!({"content": "partial"})),
            json!({"error": {"message": "This model's maximum context length is 128000 tokens", "code": 400}}),
        ]),
    )
    .await;

    let request = StreamRequest::new(ModelConfig::new("meta-llama/llama-3-70b"), vec![Message::user("go")])
        .with_vendor(Vendor::OpenRouter)
        .with_credentials(VendorCredentials::api_key("or-key").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert_eq!(collected.transcript(), "partial");
    assert!(collected.errors[0].contains("maximum context length"));
}

#[tokio::test]
async fn test_effort_hint_only_for_vendors_that_take_it() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        "/chat/completions",
        sse_with_done(&[delta(json!({"content": "ok"}))]),
    )
    .await;

    for (model_id, vendor) in [("qwen3-32b", Vendor::Groq), ("magistral-medium-latest", Vendor::Mistral)] {
        let mut model = ModelConfig::new(model_id);
        model.reasoning_effort = Some(ReasoningEffort::Low);
        let request = StreamRequest::new(model, vec![Message::user("hi")])
            .with_vendor(vendor)
            .with_credentials(VendorCredentials::api_key("key").with_base_url(server.uri()));

        let sink = CollectingSink::new();
        Dispatcher::new().stream(request, &sink).await;
        assert_eq!(sink.snapshot().await.completions, 1);
    }

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["reasoning_effort"], json!("low"));
    assert!(bodies[1].get("reasoning_effort").is_none());
}
