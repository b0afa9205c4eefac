//! QA tests for completion backend selection.
//!
//! These tests verify the local-first selection policy, its bounded polling,
//! the notices shown along the way, and both HTTP backends against a mock
//! server.
//! Run with: `cargo test -p datecity-core --test qa_gateway`

use datecity_core::gateway::{
    select_backend, DetectPolicy, LocalBackend, RemoteBackend, StreamUpdate,
};
use datecity_core::testing::{MockBackend, RecordingNotifier};
use datecity_core::{
    BackendKind, CompletionBackend, CompletionOptions, GameSession, GatewayError, LogTarget,
    Message, Notice, SessionConfig,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> DetectPolicy {
    DetectPolicy {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(50),
    }
}

fn shared(backend: MockBackend) -> Arc<MockBackend> {
    Arc::new(backend)
}

fn as_dyn(backend: &Arc<MockBackend>) -> Option<Arc<dyn CompletionBackend>> {
    Some(backend.clone() as Arc<dyn CompletionBackend>)
}

// =============================================================================
// SELECTION POLICY
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_local_detected_immediately() {
    let local = shared(MockBackend::new(BackendKind::Local));
    let remote = remote_backend();
    let notifier = RecordingNotifier::new();

    let selected = select_backend(as_dyn(&local), as_dyn(&remote), fast_policy(), &notifier)
        .await
        .expect("a backend should be selected");

    assert_eq!(selected.kind(), BackendKind::Local);
    assert_eq!(local.probe_count(), 1);
    assert_eq!(notifier.notices(), vec![Notice::LocalProviderDetected]);
}

#[tokio::test(start_paused = true)]
async fn test_local_detected_while_polling() {
    let local = shared(MockBackend::new(BackendKind::Local).available_after(3));
    let notifier = RecordingNotifier::new();

    let selected = select_backend(as_dyn(&local), None, fast_policy(), &notifier).await;

    assert_eq!(selected.map(|b| b.kind()), Some(BackendKind::Local));
    assert_eq!(local.probe_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_polling_is_bounded() {
    let local = shared(MockBackend::new(BackendKind::Local).unavailable());
    let notifier = RecordingNotifier::new();

    let selected = select_backend(as_dyn(&local), None, fast_policy(), &notifier).await;

    assert!(selected.is_none());
    // Probes at 0, 10, 20, 30, 40 and 50ms.
    assert_eq!(local.probe_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_to_remote() {
    let local = shared(MockBackend::new(BackendKind::Local).unavailable());
    let remote = remote_backend();
    let notifier = RecordingNotifier::new();

    let selected = select_backend(as_dyn(&local), as_dyn(&remote), fast_policy(), &notifier).await;

    assert_eq!(selected.map(|b| b.kind()), Some(BackendKind::Remote));
    assert_eq!(notifier.notices(), vec![Notice::InstallLocalProvider]);
}

#[tokio::test(start_paused = true)]
async fn test_no_backend_at_all() {
    let local = shared(MockBackend::new(BackendKind::Local).unavailable());
    let remote = Arc::new(MockBackend::new(BackendKind::Remote).unavailable());
    let notifier = RecordingNotifier::new();

    let selected = select_backend(as_dyn(&local), as_dyn(&remote), fast_policy(), &notifier).await;

    assert!(selected.is_none());
    assert_eq!(
        notifier.notices(),
        vec![Notice::InstallLocalProvider, Notice::BackendUnavailable]
    );
}

#[tokio::test(start_paused = true)]
async fn test_local_disabled_skips_detection() {
    let remote = remote_backend();
    let notifier = RecordingNotifier::new();

    let selected = select_backend(None, as_dyn(&remote), fast_policy(), &notifier).await;

    assert_eq!(selected.map(|b| b.kind()), Some(BackendKind::Remote));
    assert!(notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_local_falls_back_within_timeout() {
    let local = shared(
        MockBackend::new(BackendKind::Local)
            .unavailable()
            .with_probe_delay(Duration::from_millis(30)),
    );
    let remote = remote_backend();
    let notifier = RecordingNotifier::new();

    let started = Instant::now();
    let selected = select_backend(as_dyn(&local), as_dyn(&remote), fast_policy(), &notifier).await;

    assert_eq!(selected.map(|b| b.kind()), Some(BackendKind::Remote));
    assert!(started.elapsed() <= fast_policy().timeout + Duration::from_millis(2));
    assert_eq!(notifier.notices(), vec![Notice::InstallLocalProvider]);
}

fn remote_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::new(BackendKind::Remote))
}

// =============================================================================
// SESSION START
// =============================================================================

fn offline_config(dir: &TempDir) -> SessionConfig {
    SessionConfig::new()
        .with_data_dir(dir.path())
        // Nothing listens on the discard port.
        .with_local_url("http://127.0.0.1:9/v1")
        .with_detect_policy(fast_policy())
        .with_log(LogTarget::Disabled)
}

#[tokio::test]
async fn test_start_without_any_backend() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let notifier = Arc::new(RecordingNotifier::new());

    let mut session = GameSession::start(offline_config(&temp_dir), notifier.clone()).await;

    assert_eq!(session.backend_kind(), None);
    assert_eq!(
        notifier.notices(),
        vec![Notice::InstallLocalProvider, Notice::BackendUnavailable]
    );
    assert!(session.submit("").await.is_err());
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn test_start_with_api_key_selects_remote() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let notifier = Arc::new(RecordingNotifier::new());
    let config = offline_config(&temp_dir).with_api_key("sk-or-test");

    let session = GameSession::start(config, notifier.clone()).await;

    assert_eq!(session.backend_kind(), Some(BackendKind::Remote));
    assert_eq!(session.current_model(), Some("openai/gpt-4"));
    assert!(session.is_durable());
    assert_eq!(notifier.notices(), vec![Notice::InstallLocalProvider]);
}

#[tokio::test]
async fn test_start_detects_local_server_and_plays() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_stream(&server, OPENING_SSE).await;

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let notifier = Arc::new(RecordingNotifier::new());
    let config = offline_config(&temp_dir)
        .with_local_url(format!("{}/v1", server.uri()))
        .with_detect_policy(DetectPolicy::default());

    let mut session = GameSession::start(config, notifier.clone()).await;
    assert_eq!(session.backend_kind(), Some(BackendKind::Local));
    assert_eq!(notifier.notices(), vec![Notice::LocalProviderDetected]);

    let report = session.submit("").await.expect("start should succeed");
    assert!(report.reply.starts_with("Welcome to DateCity, café 🌹"));
    assert!(!report.reply.contains("Adults only."));
    assert_eq!(report.status.money, "$100");
    assert_eq!(session.current_model(), Some("qwen2.5-7b-instruct"));
}

// =============================================================================
// HTTP BACKENDS
// =============================================================================

const OPENING_SSE: &str = concat!(
    "data: {\"id\":\"c1\",\"model\":\"qwen2.5-7b-instruct\",\"choices\":[{\"delta\":{\"content\":\"<warning>Adults only.</warning>\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"model\":\"qwen2.5-7b-instruct\",\"choices\":[{\"delta\":{\"content\":\"Welcome to DateCity, café 🌹\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"model\":\"qwen2.5-7b-instruct\",\"choices\":[{\"delta\":{\"content\":\"\\n\\n[Stats] Day: 0 | HP: 100 | Money: $100 | Strength: 10 | Intelligence: 10 [Stats]\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

async fn mount_models(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{ "id": "qwen2.5-7b-instruct" }]
        })))
        .mount(server)
        .await;
}

async fn mount_stream(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

fn start_request() -> Vec<Message> {
    vec![Message::system("prompt"), Message::user("Start Game")]
}

#[tokio::test]
async fn test_local_backend_available_when_models_answer() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let local = LocalBackend::new(format!("{}/v1", server.uri()), "local-model");
    assert!(local.is_available().await);
}

#[tokio::test]
async fn test_local_backend_streams_model_and_fragments() {
    let server = MockServer::start().await;
    mount_stream(&server, OPENING_SSE).await;

    let local = LocalBackend::new(format!("{}/v1", server.uri()), "local-model");
    let updates: Vec<StreamUpdate> = local
        .complete(start_request(), &CompletionOptions::default())
        .await
        .expect("stream should open")
        .collect()
        .await;

    assert!(matches!(&updates[0], StreamUpdate::Model(m) if m == "qwen2.5-7b-instruct"));
    let fragments: Vec<&str> = updates
        .iter()
        .filter_map(|u| match u {
            StreamUpdate::Fragment(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[1], "Welcome to DateCity, café 🌹");
    assert!(!updates.iter().any(|u| matches!(u, StreamUpdate::Failed(_))));

    let requests = server.received_requests().await.expect("requests are recorded");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "local-model");
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_tokens"], 1000);
}

#[tokio::test]
async fn test_local_backend_error_chunk_fails_stream() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"You walk in\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"context length exceeded\"}}\n\n",
        ),
    )
    .await;

    let local = LocalBackend::new(format!("{}/v1", server.uri()), "local-model");
    let updates: Vec<StreamUpdate> = local
        .complete(start_request(), &CompletionOptions::default())
        .await
        .expect("stream should open")
        .collect()
        .await;

    assert!(matches!(&updates[0], StreamUpdate::Fragment(t) if t == "You walk in"));
    assert!(matches!(
        updates.last(),
        Some(StreamUpdate::Failed(GatewayError::Stream(m))) if m == "context length exceeded"
    ));
}

#[tokio::test]
async fn test_remote_backend_delivers_single_fragment() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-or-test"))
        .and(header("HTTP-Referer", "https://datecity.example"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "gen-1",
            "model": "openai/gpt-4",
            "choices": [{
                "message": { "role": "assistant", "content": "Welcome! [$] You find $5." },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = completion::Client::new(format!("{}/api/v1", server.uri()))
        .with_api_key("sk-or-test")
        .with_referer("https://datecity.example");
    let remote = RemoteBackend::new(client);

    let updates: Vec<StreamUpdate> = remote
        .complete(start_request(), &CompletionOptions::default())
        .await
        .expect("completion should succeed")
        .collect()
        .await;

    assert_eq!(updates.len(), 2);
    assert!(matches!(&updates[0], StreamUpdate::Model(m) if m == "openai/gpt-4"));
    assert!(matches!(&updates[1], StreamUpdate::Fragment(t) if t == "Welcome! [$] You find $5."));

    let requests = server.received_requests().await.expect("requests are recorded");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["stream"], false);
    assert_eq!(body["temperature"], 1.0);
}

#[tokio::test]
async fn test_remote_backend_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("No auth credentials found"))
        .mount(&server)
        .await;

    let client = completion::Client::new(format!("{}/api/v1", server.uri())).with_api_key("bad");
    let result = RemoteBackend::new(client)
        .complete(start_request(), &CompletionOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(GatewayError::Request(completion::Error::Api { status: 401, .. }))
    ));
}
