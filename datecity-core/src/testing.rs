//! Testing utilities for DateCity.
//!
//! - `MockBackend` for deterministic completions without a model server
//! - `RecordingNotifier` and `RecordingLog` to observe side channels
//! - `TestHarness` for scripted game scenarios

use crate::conversation_log::{ConversationLog, LogRecord};
use crate::gateway::{
    BackendKind, CompletionBackend, CompletionOptions, GatewayError, StreamUpdate, UpdateStream,
};
use crate::markers::Cue;
use crate::notify::{Notice, Notifier};
use crate::persist::MemoryStorage;
use crate::session::{GameSession, SessionError, TurnReport};
use crate::store::ConversationStore;
use crate::transcript::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scripted completion.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Deliver these fragments, then finish.
    Fragments(Vec<String>),
    /// Deliver these fragments, then fail mid-stream.
    FailAfter { fragments: Vec<String>, error: String },
    /// Refuse the request before any fragment.
    Reject(String),
}

impl MockReply {
    /// The whole reply as a single fragment.
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Fragments(vec![text.into()])
    }

    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockReply::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

/// A backend that replays scripted replies and records every request.
pub struct MockBackend {
    kind: BackendKind,
    model: String,
    reported_model: Mutex<Option<String>>,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
    options: Mutex<Vec<CompletionOptions>>,
    /// Probes answered `false` before the backend reports ready.
    unavailable_probes: AtomicUsize,
    probes: AtomicUsize,
    probe_delay: Duration,
}

impl MockBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            model: "mock-model".to_string(),
            reported_model: Mutex::new(None),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
            unavailable_probes: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            probe_delay: Duration::ZERO,
        }
    }

    /// Become available only after `probes` failed probes.
    pub fn available_after(self, probes: usize) -> Self {
        self.unavailable_probes.store(probes, Ordering::SeqCst);
        self
    }

    /// Never become available.
    pub fn unavailable(self) -> Self {
        self.available_after(usize::MAX)
    }

    /// Take `delay` to answer each availability probe.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Model name announced at the start of each reply.
    pub fn set_reported_model(&self, model: impl Into<String>) {
        *lock(&self.reported_model) = Some(model.into());
    }

    pub fn queue(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Message sequences received, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    /// Options received, oldest first.
    pub fn options(&self) -> Vec<CompletionOptions> {
        lock(&self.options).clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let probe = self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        probe >= self.unavailable_probes.load(Ordering::SeqCst)
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> Result<UpdateStream, GatewayError> {
        lock(&self.requests).push(messages);
        lock(&self.options).push(*options);

        let reply = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| MockReply::text("The city has nothing more to say."));
        let model = lock(&self.reported_model)
            .clone()
            .unwrap_or_else(|| self.model.clone());

        let (fragments, error) = match reply {
            MockReply::Reject(reason) => return Err(GatewayError::Stream(reason)),
            MockReply::Fragments(fragments) => (fragments, None),
            MockReply::FailAfter { fragments, error } => (fragments, Some(error)),
        };

        let mut updates = vec![StreamUpdate::Model(model)];
        updates.extend(fragments.into_iter().map(StreamUpdate::Fragment));
        if let Some(error) = error {
            updates.push(StreamUpdate::Failed(GatewayError::Stream(error)));
        }
        Ok(Box::pin(futures::stream::iter(updates)))
    }
}

/// Notifier that remembers everything it was told.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    cues: Mutex<Vec<Cue>>,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        lock(&self.cues).clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn cue(&self, cue: Cue) {
        lock(&self.cues).push(cue);
    }

    fn notice(&self, notice: Notice) {
        lock(&self.notices).push(notice);
    }
}

/// Conversation log kept in memory. Clones share the records.
#[derive(Debug, Clone, Default)]
pub struct RecordingLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }
}

impl ConversationLog for RecordingLog {
    fn record(&mut self, record: LogRecord) {
        lock(&self.records).push(record);
    }
}

/// Test harness for running game scenarios.
pub struct TestHarness {
    /// The session under test.
    pub session: GameSession,
    /// The scripted backend (not selected by `without_backend`).
    pub backend: Arc<MockBackend>,
    pub notifier: Arc<RecordingNotifier>,
    /// Shared handle to the session's storage.
    pub storage: MemoryStorage,
    pub log: RecordingLog,
}

impl TestHarness {
    /// A fresh game on in-memory storage with a local mock backend.
    pub fn new() -> Self {
        Self::build(MemoryStorage::new(), true)
    }

    /// A fresh game with no backend selected.
    pub fn without_backend() -> Self {
        Self::build(MemoryStorage::new(), false)
    }

    /// Resume from existing storage.
    pub fn with_storage(storage: MemoryStorage) -> Self {
        Self::build(storage, true)
    }

    fn build(storage: MemoryStorage, with_backend: bool) -> Self {
        let backend = Arc::new(MockBackend::new(BackendKind::Local));
        let notifier = Arc::new(RecordingNotifier::new());
        let log = RecordingLog::new();

        let store = ConversationStore::load(Box::new(storage.clone()));
        let selected = with_backend.then(|| backend.clone() as Arc<dyn CompletionBackend>);
        let session = GameSession::from_parts(
            store,
            selected,
            notifier.clone(),
            Box::new(log.clone()),
            crate::prompt::SYSTEM_PROMPT,
            CompletionOptions::default(),
        );

        Self {
            session,
            backend,
            notifier,
            storage,
            log,
        }
    }

    /// Queue a scripted reply.
    pub fn expect_reply(&mut self, reply: MockReply) -> &mut Self {
        self.backend.queue(reply);
        self
    }

    /// Queue a single-fragment reply.
    pub fn expect_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.expect_reply(MockReply::text(text))
    }

    /// Submit player input.
    pub async fn input(&mut self, text: &str) -> Result<TurnReport, SessionError> {
        self.session.submit(text).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
