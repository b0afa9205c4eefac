//! HTTP tests for the completion client against a mock server.
//!
//! Run with: `cargo test -p completion --test api_integration`

use completion::{Client, Error, FinishReason, Message, Request, StreamEvent};
use futures::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    Client::new(format!("{}/v1", server.uri()))
}

fn start_game() -> Request {
    Request::new(vec![Message::system("You are DateCity"), Message::user("Start Game")])
        .with_temperature(1.0)
        .with_max_tokens(1000)
}

// =============================================================================
// NON-STREAMING
// =============================================================================

#[tokio::test]
async fn test_complete_sends_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-or-test"))
        .and(header("HTTP-Referer", "https://datecity.example"))
        .and(header("X-Title", "DateCity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "gen-1",
            "model": "openai/gpt-4",
            "choices": [{
                "message": { "role": "assistant", "content": "Welcome to DateCity!" },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)
        .with_api_key("sk-or-test")
        .with_referer("https://datecity.example")
        .with_title("DateCity");
    let response = client.complete(start_game()).await.expect("completion should succeed");

    assert_eq!(response.id, "gen-1");
    assert_eq!(response.model, "openai/gpt-4");
    assert_eq!(response.text(), "Welcome to DateCity!");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));

    let requests = server.received_requests().await.expect("requests are recorded");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "openai/gpt-4");
    assert_eq!(body["stream"], false);
    assert_eq!(body["temperature"], 1.0);
    assert_eq!(body["max_tokens"], 1000);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Start Game");
}

#[tokio::test]
async fn test_complete_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(402).set_body_string("Insufficient credits"))
        .mount(&server)
        .await;

    match client_for(&server).complete(start_game()).await {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 402);
            assert_eq!(message, "Insufficient credits");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

// =============================================================================
// STREAMING
// =============================================================================

#[tokio::test]
async fn test_stream_events() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"id\":\"c1\",\"model\":\"qwen2.5-7b\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Café \"}}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"qwen2.5-7b\",\"choices\":[{\"delta\":{\"content\":\"🌹 [+]\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).with_model("local-model");
    let events: Vec<StreamEvent> = client
        .stream(start_game())
        .await
        .expect("stream should open")
        .map(|event| event.expect("event should parse"))
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::MessageStart {
                id: "c1".to_string(),
                model: "qwen2.5-7b".to_string()
            },
            StreamEvent::TextDelta {
                text: "Café ".to_string()
            },
            StreamEvent::TextDelta {
                text: "🌹 [+]".to_string()
            },
            StreamEvent::MessageDelta {
                finish_reason: Some(FinishReason::Stop)
            },
            StreamEvent::MessageStop,
        ]
    );

    let requests = server.received_requests().await.expect("requests are recorded");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "local-model");
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn test_stream_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let result = client_for(&server).stream(start_game()).await;
    assert!(matches!(result, Err(Error::Api { status: 500, .. })));
}

// =============================================================================
// MODEL LISTING
// =============================================================================

#[tokio::test]
async fn test_list_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": [
                { "id": "qwen2.5-7b-instruct", "object": "model" },
                { "id": "llama-3.2-3b", "object": "model" }
            ]
        })))
        .mount(&server)
        .await;

    let models = client_for(&server).list_models().await.expect("listing should succeed");
    assert_eq!(models, vec!["qwen2.5-7b-instruct", "llama-3.2-3b"]);
}

#[tokio::test]
async fn test_list_models_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client_for(&server).list_models().await;
    assert!(matches!(result, Err(Error::Api { status: 503, .. })));
}
