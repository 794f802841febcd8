//! OpenAI Responses API streams against a mock server

mod common;

use braid::llm::sink::CollectingSink;
use braid::llm::{Dispatcher, ModelConfig, ReasoningEffort, StreamRequest, VendorCredentials};
use braid::telemetry::ChannelTelemetry;
use braid::types::{Attachment, AttachmentKind, Message, Tool, ToolCall, ToolResult};
use common::{assert_single_terminal, assert_spans_balanced, request_bodies, sse, sse_response};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer};

const PNG_HEADER: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

fn search_tool() -> Tool {
    Tool::new(
        "search_docs",
        "Search project documentation",
        json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
    )
}

#[tokio::test]
async fn test_summary_channels_function_call_and_native_items() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}}),
        json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1", "summary": []}}),
        json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "summary_index": 0, "delta": "First idea"}),
        json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "summary_index": 1, "delta": "Second idea"}),
        json!({"type": "response.output_item.done", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1"}}),
        json!({"type": "response.output_item.added", "output_index": 1, "item": {"type": "web_search_call", "id": "ws_1", "status": "in_progress"}}),
        json!({"type": "response.output_item.done", "output_index": 1, "item": {"type": "web_search_call", "id": "ws_1", "status": "completed"}}),
        json!({"type": "response.output_item.added", "output_index": 2, "item": {"type": "function_call", "id": "fc_1", "call_id": "call_abc", "name": "search_docs", "arguments": ""}}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 2, "delta": "{\"query\":"}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 2, "delta": "\"streaming\"}"}),
        json!({"type": "response.function_call_arguments.done", "item_id": "fc_1", "output_index": 2, "arguments": "{\"query\":\"streaming\"}"}),
        json!({"type": "response.output_item.done", "output_index": 2, "item": {"type": "function_call", "id": "fc_1", "call_id": "call_abc", "name": "search_docs", "arguments": "{\"query\":\"streaming\"}"}}),
        json!({"type": "response.output_text.delta", "item_id": "msg_1", "output_index": 3, "delta": "Searching now."}),
        json!({"type": "response.completed", "response": {"id": "resp_1", "status": "completed"}}),
    ]);

    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("diagram.bin");
    let mut bytes = PNG_HEADER.to_vec();
    bytes.extend_from_slice(&[0u8; 32]);
    std::fs::write(&image, bytes).unwrap();

    let mut model = ModelConfig::new("o4-mini");
    model.show_reasoning = true;
    model.reasoning_effort = Some(ReasoningEffort::High);
    model.temperature = Some(0.7);
    model.system_prompt = Some("Answer from the docs.".to_string());
    let request = StreamRequest::new(
        model,
        vec![Message::user_with_attachments(
            "What does this diagram show?",
            vec![Attachment::new(AttachmentKind::Image, image, "diagram.bin")],
        )],
    )
    .with_tools(vec![search_tool()])
    .with_credentials(VendorCredentials::api_key("sk-test").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    let transcript = collected.transcript();
    assert_spans_balanced(&transcript);
    // A new summary index closes the previous span and opens another
    assert_eq!(transcript.matches("<think>").count(), 2);
    assert!(transcript.ends_with("Searching now."));
    assert_eq!(collected.final_text.as_deref(), Some("Searching now."));

    assert_eq!(collected.tool_calls.len(), 1);
    assert_eq!(collected.tool_calls[0].id, "call_abc");
    assert_eq!(
        collected.tool_calls[0].arguments.get("query"),
        Some(&json!("streaming"))
    );

    let sent = &request_bodies(&server).await[0];
    assert_eq!(sent["instructions"], json!("Answer from the docs."));
    assert_eq!(sent["reasoning"]["effort"], json!("high"));
    assert!(sent.get("temperature").is_none());
    assert_eq!(sent["tools"][0]["type"], json!("function"));

    let parts = sent["input"][0]["content"].as_array().unwrap();
    let image_part = parts
        .iter()
        .find(|part| part["type"] == json!("input_image"))
        .expect("image part");
    assert!(image_part["image_url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_tool_round_trip_input_shape() {
    let server = MockServer::start().await;
    common::mount_sse(
        &server,
        "/responses",
        sse(&[
            json!({"type": "response.output_text.delta", "delta": "It streams."}),
            json!({"type": "response.completed", "response": {}}),
        ]),
    )
    .await;

    let mut arguments = serde_json::Map::new();
    arguments.insert("query".to_string(), json!("sse"));
    let call = ToolCall {
        id: "call_1".to_string(),
        name: "search_docs".to_string(),
        arguments,
        metadata: None,
    };
    let conversation = vec![
        Message::user("how does it stream?"),
        Message::assistant_with_calls("", vec![call]),
        Message::tool_results(vec![ToolResult::new("call_1", "Uses server-sent events.")]),
    ];
    let request = StreamRequest::new(ModelConfig::new("gpt-4.1"), conversation)
        .with_tools(vec![search_tool()])
        .with_credentials(VendorCredentials::api_key("sk-test").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    assert_eq!(sink.snapshot().await.final_text.as_deref(), Some("It streams."));

    let sent = &request_bodies(&server).await[0];
    let input = sent["input"].as_array().unwrap();
    assert_eq!(input[1]["type"], json!("function_call"));
    assert_eq!(input[1]["call_id"], json!("call_1"));
    assert_eq!(input[1]["arguments"], json!("{\"query\":\"sse\"}"));
    assert_eq!(input[2]["type"], json!("function_call_output"));
    assert_eq!(input[2]["output"], json!("Uses server-sent events."));
}

#[tokio::test]
async fn test_failed_response_reports_message() {
    let server = MockServer::start().await;
    common::mount_sse(
        &server,
        "/responses",
        sse(&[
            json!({"type": "response.output_text.delta", "delta": "Partial"}),
            json!({"type": "response.failed", "response": {"error": {"code": "server_error", "message": "The model crashed"}}}),
        ]),
    )
    .await;

    let request = StreamRequest::new(ModelConfig::new("gpt-4o"), vec![Message::user("go")])
        .with_credentials(VendorCredentials::api_key("sk-test").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert_eq!(collected.transcript(), "Partial");
    assert!(collected.errors[0].contains("The model crashed"));
}

#[tokio::test]
async fn test_context_overflow_classified_from_error_code() {
    let server = MockServer::start().await;
    common::mount_sse(
        &server,
        "/responses",
        sse(&[json!({"type": "response.failed", "response": {"status": "failed", "error": {
            "code": "context_length_exceeded",
            "message": "Your input exceeds the context window of this model. Please adjust your input and try again."
        }}})]),
    )
    .await;

    let (telemetry, mut failures) = ChannelTelemetry::new();
    let dispatcher = Dispatcher::new().with_telemetry(Arc::new(telemetry));
    let request = StreamRequest::new(ModelConfig::new("gpt-4.1"), vec![Message::user("a very long prompt")])
        .with_credentials(VendorCredentials::api_key("sk-test").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    dispatcher.stream(request, &sink).await;
    let collected = sink.snapshot().await;

    assert_single_terminal(&collected);
    assert!(collected.errors[0].contains("Your input exceeds the context window"));

    let failure = failures.recv().await.unwrap();
    assert!(failure.context_limit);
    assert_eq!(failure.kind, braid::error::ErrorKind::Protocol);
}

#[tokio::test]
async fn test_show_reasoning_requests_summaries_without_effort() {
    let server = MockServer::start().await;
    common::mount_sse(
        &server,
        "/responses",
        sse(&[
            json!({"type": "response.reasoning_summary_text.delta", "summary_index": 0, "delta": "Short plan"}),
            json!({"type": "response.output_text.delta", "delta": "Done."}),
            json!({"type": "response.completed", "response": {}}),
        ]),
    )
    .await;

    let mut model = ModelConfig::new("o3");
    model.show_reasoning = true;
    let request = StreamRequest::new(model, vec![Message::user("plan it")])
        .with_credentials(VendorCredentials::api_key("sk-test").with_base_url(server.uri()));

    let sink = CollectingSink::new();
    Dispatcher::new().stream(request, &sink).await;
    let collected = sink.snapshot().await;
    assert!(collected.transcript().starts_with("<think>Short plan</think>"));

    let sent = &request_bodies(&server).await[0];
    assert_eq!(sent["reasoning"], json!({"summary": "auto"}));
}
