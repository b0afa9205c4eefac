//! Minimal OpenAI-compatible chat completions client.
//!
//! This crate provides a focused client for the `/chat/completions` API
//! spoken by hosted routers and by local model servers alike:
//! - Non-streaming and streaming completions
//! - Buffered SSE parsing for streaming responses
//! - Model listing, usable as a cheap availability probe

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;
use tracing::debug;

/// Hosted router used when no base URL is given.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Model requested when neither the client nor the request names one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4";

/// Longest a model-listing probe may take before it counts as a failure.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors that can occur when using the completion client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Chat completions client.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    referer: Option<String>,
    title: Option<String>,
}

impl Client {
    /// Create a client for the API rooted at `base_url` (e.g. `http://localhost:1234/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            referer: None,
            title: None,
        }
    }

    /// Set the bearer credential sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the `HTTP-Referer` header some routers use to attribute traffic.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Set the `X-Title` header some routers display for the calling app.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request, false);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response)
    }

    /// Send a completion request and stream the response.
    pub async fn stream(
        &self,
        request: Request,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>, Error> {
        let api_request = self.build_api_request(&request, true);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        // Use scan to keep a buffer for SSE lines split across chunks
        let stream = response
            .bytes_stream()
            .scan(SseState::default(), |state, result| {
                let events = match result {
                    Ok(bytes) => {
                        state.buffer.extend_from_slice(&bytes);
                        parse_sse_events_buffered(state)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    /// List the model identifiers the server offers.
    ///
    /// Local servers answer this without credentials, which makes it the
    /// availability probe for an installed provider.
    pub async fn list_models(&self) -> Result<Vec<String>, Error> {
        let mut builder = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(PROBE_TIMEOUT);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let list: ApiModelList = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
            );
        }
        if let Some(ref referer) = self.referer {
            headers.insert(
                "HTTP-Referer",
                HeaderValue::from_str(referer)
                    .map_err(|e| Error::Config(format!("Invalid referer: {e}")))?,
            );
        }
        if let Some(ref title) = self.title {
            headers.insert(
                "X-Title",
                HeaderValue::from_str(title)
                    .map_err(|e| Error::Config(format!("Invalid title: {e}")))?,
            );
        }
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request, stream: bool) -> ApiRequest {
        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A message in the conversation.
///
/// Serializes to the `{ "role": ..., "content": ... }` shape the API expects,
/// which is also the shape transcripts are stored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<FinishReason>,
}

impl Response {
    /// The assistant text of the first choice.
    pub fn text(&self) -> &str {
        &self.content
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

impl FinishReason {
    fn parse(s: &str) -> Self {
        match s {
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

// ============================================================================
// Streaming types
// ============================================================================

/// Events from a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// First chunk seen; carries the id and the model that actually answered.
    MessageStart { id: String, model: String },
    TextDelta { text: String },
    MessageDelta { finish_reason: Option<FinishReason> },
    MessageStop,
    Error { message: String },
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ApiModelList {
    #[serde(default)]
    data: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiChunkChoice {
    #[serde(default)]
    delta: Option<ApiDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    // Some routers report failures in a 200 body
    if let Some(error) = api_response.error {
        return Err(Error::Api {
            status: error.code.unwrap_or(200),
            message: error.message,
        });
    }

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("response contained no choices".to_string()))?;

    Ok(Response {
        id: api_response.id,
        model: api_response.model,
        content: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
    })
}

/// Raw line buffer plus whether `MessageStart` has been emitted yet.
///
/// Bytes are kept undecoded until a full line arrives, since a network chunk
/// can end inside a multi-byte character.
#[derive(Debug, Default)]
struct SseState {
    buffer: Vec<u8>,
    started: bool,
}

/// Parse SSE events from a buffer, consuming complete lines and leaving incomplete data.
///
/// Only `data:` lines carry payloads; comments (`: keep-alive`), `event:`
/// lines and blank separators are skipped.
fn parse_sse_events_buffered(state: &mut SseState) -> Vec<Result<StreamEvent, Error>> {
    let mut events = Vec::new();

    while let Some(newline_pos) = state.buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
        let line = match std::str::from_utf8(&raw[..newline_pos]) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(e) => {
                events.push(Err(Error::Parse(format!("SSE line is not UTF-8: {e}"))));
                continue;
            }
        };

        if let Some(json_str) = line.strip_prefix("data:").map(str::trim_start) {
            if json_str == "[DONE]" {
                events.push(Ok(StreamEvent::MessageStop));
            } else if !json_str.is_empty() {
                match serde_json::from_str::<ApiChunk>(json_str) {
                    Ok(chunk) => convert_chunk(chunk, &mut state.started, &mut events),
                    Err(e) => events.push(Err(Error::Parse(format!("SSE parse error: {e}")))),
                }
            }
        } else if !line.is_empty() {
            debug!(line = %line, "Skipping SSE metadata line");
        }
    }

    events
}

fn convert_chunk(
    chunk: ApiChunk,
    started: &mut bool,
    events: &mut Vec<Result<StreamEvent, Error>>,
) {
    if let Some(error) = chunk.error {
        events.push(Ok(StreamEvent::Error {
            message: error.message,
        }));
        return;
    }

    if !*started && (chunk.id.is_some() || chunk.model.is_some()) {
        *started = true;
        events.push(Ok(StreamEvent::MessageStart {
            id: chunk.id.unwrap_or_default(),
            model: chunk.model.unwrap_or_default(),
        }));
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::TextDelta { text }));
            }
        }
        if let Some(reason) = choice.finish_reason {
            events.push(Ok(StreamEvent::MessageDelta {
                finish_reason: Some(FinishReason::parse(&reason)),
            }));
        }
    }
}
