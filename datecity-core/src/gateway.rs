//! Completion backends and backend selection.
//!
//! A local OpenAI-compatible server (LM Studio and friends) is preferred: it
//! streams and needs no credentials. When none answers within the detection
//! window, the remote gateway is used if an API key is configured.

use crate::notify::{Notice, Notifier};
use crate::transcript::Message;
use async_trait::async_trait;
use completion::{Client, Request, StreamEvent};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Base URL of the local server default (LM Studio).
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:1234/v1";

/// Model name sent to the local server, which serves whatever is loaded.
pub const DEFAULT_LOCAL_MODEL: &str = "local-model";

/// Errors from a completion backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Completion request failed: {0}")]
    Request(#[from] completion::Error),

    #[error("Completion stream failed: {0}")]
    Stream(String),
}

/// Sampling options passed to either backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// One item of a completion, in arrival order.
#[derive(Debug)]
pub enum StreamUpdate {
    /// The model that is actually answering.
    Model(String),
    /// Text to append to the reply. Fragments concatenate to the full reply.
    Fragment(String),
    /// The completion broke off; nothing further will arrive.
    Failed(GatewayError),
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = StreamUpdate> + Send>>;

/// A source of chat completions.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Model requested from this backend.
    fn model(&self) -> &str;

    /// Cheap readiness check, called repeatedly during detection.
    async fn is_available(&self) -> bool;

    /// Start a completion over the full request sequence.
    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> Result<UpdateStream, GatewayError>;
}

fn build_request(messages: Vec<Message>, options: &CompletionOptions) -> Request {
    Request::new(messages)
        .with_temperature(options.temperature)
        .with_max_tokens(options.max_tokens)
}

/// Streaming backend for a local OpenAI-compatible server.
pub struct LocalBackend {
    client: Client,
}

impl LocalBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(base_url).with_model(model),
        }
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    async fn is_available(&self) -> bool {
        match self.client.list_models().await {
            Ok(models) => {
                tracing::debug!(url = self.client.base_url(), ?models, "Local server answered");
                true
            }
            Err(e) => {
                tracing::trace!(url = self.client.base_url(), error = %e, "Local server probe failed");
                false
            }
        }
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> Result<UpdateStream, GatewayError> {
        let events = self.client.stream(build_request(messages, options)).await?;

        let updates = events.filter_map(|event| {
            futures::future::ready(match event {
                Ok(StreamEvent::MessageStart { model, .. }) if !model.is_empty() => {
                    Some(StreamUpdate::Model(model))
                }
                Ok(StreamEvent::TextDelta { text }) => Some(StreamUpdate::Fragment(text)),
                Ok(StreamEvent::Error { message }) => {
                    Some(StreamUpdate::Failed(GatewayError::Stream(message)))
                }
                Ok(_) => None,
                Err(e) => Some(StreamUpdate::Failed(e.into())),
            })
        });

        Ok(Box::pin(updates))
    }
}

/// Non-streaming backend for the remote gateway (OpenRouter).
///
/// The whole reply arrives as one fragment.
pub struct RemoteBackend {
    client: Client,
}

impl RemoteBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    async fn is_available(&self) -> bool {
        self.client.has_api_key()
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> Result<UpdateStream, GatewayError> {
        let response = self.client.complete(build_request(messages, options)).await?;
        tracing::debug!(
            id = %response.id,
            model = %response.model,
            finish_reason = ?response.finish_reason,
            "Remote completion received"
        );

        let mut updates = Vec::with_capacity(2);
        if !response.model.is_empty() {
            updates.push(StreamUpdate::Model(response.model));
        }
        if !response.content.is_empty() {
            updates.push(StreamUpdate::Fragment(response.content));
        }
        Ok(Box::pin(futures::stream::iter(updates)))
    }
}

/// How long to wait for a local server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for DetectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Poll `backend` until it is available or the policy's timeout has elapsed.
///
/// The timeout bounds the whole detection, probes included: a probe still
/// pending at the deadline counts as unavailable.
pub async fn detect(backend: &dyn CompletionBackend, policy: DetectPolicy) -> bool {
    let deadline = Instant::now() + policy.timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, backend.is_available()).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(_) => {
                tracing::debug!(timeout = ?policy.timeout, "Availability probe timed out");
                return false;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

/// Choose the backend for this session.
///
/// The local backend wins when detected. Otherwise the player is told about
/// the local option and the remote backend is used if it is ready.
pub async fn select_backend(
    local: Option<Arc<dyn CompletionBackend>>,
    remote: Option<Arc<dyn CompletionBackend>>,
    policy: DetectPolicy,
    notifier: &dyn Notifier,
) -> Option<Arc<dyn CompletionBackend>> {
    if let Some(local) = local {
        if detect(local.as_ref(), policy).await {
            tracing::info!(model = local.model(), "Using local completion backend");
            notifier.notice(Notice::LocalProviderDetected);
            return Some(local);
        }
        notifier.notice(Notice::InstallLocalProvider);
    }

    match remote {
        Some(remote) if remote.is_available().await => {
            tracing::info!(model = remote.model(), "Using remote completion backend");
            Some(remote)
        }
        _ => {
            tracing::warn!("No completion backend available");
            notifier.notice(Notice::BackendUnavailable);
            None
        }
    }
}
