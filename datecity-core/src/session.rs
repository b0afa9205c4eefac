//! GameSession - the primary public API for playing DateCity.
//!
//! Wraps the conversation store, the selected completion backend, the
//! notifier and the conversation log into one explicitly owned value. Front
//! ends construct it once, feed it player input, and call `shutdown` on exit.

use crate::config::{LogTarget, SessionConfig, APP_TITLE};
use crate::conversation_log::{ConversationLog, JsonlLog, LogRecord, NullLog};
use crate::gateway::{
    select_backend, BackendKind, CompletionBackend, CompletionOptions, GatewayError, LocalBackend,
    RemoteBackend,
};
use crate::markers::{opening_body, Cue};
use crate::notify::{Notice, Notifier};
use crate::persist::open_storage;
use crate::status::PlayerStatus;
use crate::store::{ConversationStore, SessionId};
use crate::stream::{ReconciledTurn, StreamReconciler};
use crate::transcript::{request_messages, Message, Role, START_SENTINEL};
use std::sync::Arc;
use thiserror::Error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("No completion backend available - start a local model server or set OPENROUTER_API_KEY")]
    BackendUnavailable,

    #[error("Nothing to send")]
    EmptyInput,
}

/// Outcome of one submitted turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// The reply as displayed.
    pub reply: String,

    /// Status after the reply.
    pub status: PlayerStatus,

    /// Cues fired while the reply streamed.
    pub cues: Vec<Cue>,
}

/// A transcript entry as the player sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleMessage {
    pub role: Role,
    pub body: String,
}

/// A DateCity game session.
pub struct GameSession {
    store: ConversationStore,
    backend: Option<Arc<dyn CompletionBackend>>,
    notifier: Arc<dyn Notifier>,
    log: Box<dyn ConversationLog>,
    system_prompt: String,
    options: CompletionOptions,
    current_model: Option<String>,
}

impl GameSession {
    /// Open storage, restore the conversation and pick a backend.
    ///
    /// Never fails: missing storage runs in memory, and a missing backend
    /// leaves the session unable to submit until restarted.
    pub async fn start(config: SessionConfig, notifier: Arc<dyn Notifier>) -> Self {
        let data_dir = config.resolved_data_dir();
        let store = ConversationStore::load(open_storage(&data_dir));

        let local = config.local_url.as_ref().map(|url| {
            Arc::new(LocalBackend::new(url.as_str(), config.local_model.as_str()))
                as Arc<dyn CompletionBackend>
        });

        let mut client = completion::Client::new(config.remote_url.as_str())
            .with_model(config.remote_model.as_str())
            .with_title(APP_TITLE);
        if let Some(ref key) = config.api_key {
            client = client.with_api_key(key.as_str());
        }
        if let Some(ref referer) = config.referer {
            client = client.with_referer(referer.as_str());
        }
        let remote: Arc<dyn CompletionBackend> = Arc::new(RemoteBackend::new(client));

        let backend = select_backend(local, Some(remote), config.detect, notifier.as_ref()).await;

        let log: Box<dyn ConversationLog> = match config.log {
            LogTarget::DataDir => Box::new(JsonlLog::in_dir(&data_dir)),
            LogTarget::File(ref path) => Box::new(JsonlLog::new(path.clone())),
            LogTarget::Disabled => Box::new(NullLog),
        };

        Self::from_parts(
            store,
            backend,
            notifier,
            log,
            config.system_prompt(),
            config.options,
        )
    }

    /// Assemble a session from already-built parts.
    pub fn from_parts(
        store: ConversationStore,
        backend: Option<Arc<dyn CompletionBackend>>,
        notifier: Arc<dyn Notifier>,
        log: Box<dyn ConversationLog>,
        system_prompt: impl Into<String>,
        options: CompletionOptions,
    ) -> Self {
        let current_model = backend.as_ref().map(|b| b.model().to_string());
        Self {
            store,
            backend,
            notifier,
            log,
            system_prompt: system_prompt.into(),
            options,
            current_model,
        }
    }

    /// Whether the game has any visible content yet.
    pub fn has_started(&self) -> bool {
        self.store.active().next().is_some()
    }

    /// Submit player input and wait for the full reply.
    ///
    /// Takes `&mut self`, so a second submission cannot start while one is
    /// outstanding.
    ///
    /// Before the game has started the input is replaced by the start
    /// sentinel, so an empty line begins the game.
    pub async fn submit(&mut self, input: &str) -> Result<TurnReport, SessionError> {
        let text = if self.has_started() {
            input.trim()
        } else {
            START_SENTINEL
        };
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let Some(backend) = self.backend.clone() else {
            self.notifier.notice(Notice::BackendUnavailable);
            return Err(SessionError::BackendUnavailable);
        };

        self.log_turn(Role::User, text);

        let new_turn = Message::user(text);
        let request = request_messages(&self.system_prompt, self.store.messages(), &new_turn);
        self.store.append(new_turn);

        tracing::debug!(
            session_id = %self.store.session_id(),
            messages = request.len(),
            backend = %backend.kind(),
            "Submitting turn"
        );

        let turn = self.run_completion(backend.as_ref(), request).await?;

        if let Some(model) = turn.model {
            self.current_model = Some(model);
        }
        if !turn.content.is_empty() {
            self.log_turn(Role::Assistant, &turn.content);
        }

        let reply = self
            .visible_messages()
            .pop()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.body)
            .unwrap_or_default();

        Ok(TurnReport {
            reply,
            status: self.status(),
            cues: turn.cues,
        })
    }

    async fn run_completion(
        &mut self,
        backend: &dyn CompletionBackend,
        request: Vec<Message>,
    ) -> Result<ReconciledTurn, SessionError> {
        let updates = match backend.complete(request, &self.options).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Completion request failed");
                self.notifier.notice(Notice::CompletionFailed(e.to_string()));
                return Err(e.into());
            }
        };

        let reconciler = StreamReconciler::new(&mut self.store, self.notifier.as_ref());
        Ok(reconciler.run(updates).await?)
    }

    fn log_turn(&mut self, role: Role, message: &str) {
        let record = LogRecord::new(
            self.store.session_id(),
            role,
            message,
            self.system_prompt.as_str(),
            self.current_model.as_deref().unwrap_or_default(),
        );
        self.log.record(record);
    }

    /// Clear the game. The next submission starts a new one.
    pub fn reset(&mut self) {
        self.store.reset();
    }

    /// Current player status, derived from the transcript.
    pub fn status(&self) -> PlayerStatus {
        PlayerStatus::extract(self.store.active())
    }

    /// The active transcript as displayed, with the opening banner resolved.
    pub fn visible_messages(&self) -> Vec<VisibleMessage> {
        self.store
            .active()
            .enumerate()
            .map(|(i, m)| VisibleMessage {
                role: m.role,
                body: if i == 0 {
                    opening_body(&m.content).to_string()
                } else {
                    m.content.clone()
                },
            })
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn session_id(&self) -> SessionId {
        self.store.session_id()
    }

    /// Model last reported by the backend, or the configured one.
    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Whether progress survives a restart.
    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// Flush persistence and end the session.
    pub fn shutdown(mut self) {
        self.store.flush();
        tracing::info!(session_id = %self.store.session_id(), "Session closed");
    }
}
