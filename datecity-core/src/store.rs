//! The conversation store: the ordered transcript plus the session identity,
//! mirrored to durable storage after every mutation.
//!
//! Session rotation is tied to the transcript shrinking. Whenever a sync
//! observes fewer messages than the previous sync did, the history was
//! cleared, so a fresh identity is minted and persisted.

use crate::persist::{PersistError, Storage};
use crate::transcript::{self, Message, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Storage key of the serialized transcript.
pub const MESSAGES_KEY: &str = "datecity_messages";

/// Storage key of the session identity.
pub const SESSION_ID_KEY: &str = "datecity_session_id";

/// Identity of one playthrough, used to correlate conversation log records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The transcript shrank; a new session identity was persisted and the
    /// transcript was not written.
    Rotated,
    /// The transcript was written.
    Persisted,
    /// Empty and not shrinking; nothing written.
    Skipped,
}

/// Ordered transcript and session identity, kept in step with storage.
pub struct ConversationStore {
    storage: Box<dyn Storage>,
    messages: Vec<Message>,
    session_id: SessionId,
}

impl ConversationStore {
    /// Restore from storage.
    ///
    /// A missing or unreadable transcript starts empty. A missing or invalid
    /// identity is replaced with a fresh one, which is persisted right away.
    pub fn load(mut storage: Box<dyn Storage>) -> Self {
        let messages = match storage.get(MESSAGES_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<Message>>(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored transcript is corrupt, starting fresh");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored transcript");
                Vec::new()
            }
        };

        let stored_id = match storage.get(SESSION_ID_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<SessionId>(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session id");
                None
            }
        };

        let session_id = match stored_id {
            Some(id) => id,
            None => {
                let id = SessionId::new();
                write_value(storage.as_mut(), SESSION_ID_KEY, &id);
                id
            }
        };

        tracing::info!(
            session_id = %session_id,
            messages = messages.len(),
            durable = storage.is_durable(),
            "Conversation restored"
        );

        Self {
            storage,
            messages,
            session_id,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Transcript without the start sentinel.
    pub fn active(&self) -> impl DoubleEndedIterator<Item = &Message> {
        transcript::active_messages(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether writes survive a restart.
    pub fn is_durable(&self) -> bool {
        self.storage.is_durable()
    }

    /// Append a message and sync.
    pub fn append(&mut self, message: Message) -> SyncOutcome {
        let previous = self.messages.len();
        self.messages.push(message);
        self.sync(previous, self.messages.len())
    }

    /// Append text to the last message and sync.
    ///
    /// Only assistant messages grow; returns `None` when the last message is
    /// missing or belongs to another role.
    pub fn extend_last(&mut self, fragment: &str) -> Option<SyncOutcome> {
        let last = self.messages.last_mut()?;
        if last.role != Role::Assistant {
            return None;
        }
        last.content.push_str(fragment);
        let len = self.messages.len();
        Some(self.sync(len, len))
    }

    /// Clear the transcript.
    ///
    /// The empty transcript is written first, then the shrink rotates the
    /// session identity.
    pub fn reset(&mut self) -> SyncOutcome {
        let previous = self.messages.len();
        self.messages.clear();
        write_value(self.storage.as_mut(), MESSAGES_KEY, &self.messages);
        self.sync(previous, 0)
    }

    /// Reconcile storage after the transcript went from `previous_len` to
    /// `current_len` messages.
    pub fn sync(&mut self, previous_len: usize, current_len: usize) -> SyncOutcome {
        if current_len < previous_len {
            self.session_id = SessionId::new();
            write_value(self.storage.as_mut(), SESSION_ID_KEY, &self.session_id);
            tracing::info!(session_id = %self.session_id, "Transcript cleared, new session");
            SyncOutcome::Rotated
        } else if current_len > 0 {
            write_value(self.storage.as_mut(), MESSAGES_KEY, &self.messages);
            SyncOutcome::Persisted
        } else {
            SyncOutcome::Skipped
        }
    }

    /// Write the transcript (when non-empty) and the identity, e.g. before exit.
    pub fn flush(&mut self) {
        if !self.messages.is_empty() {
            write_value(self.storage.as_mut(), MESSAGES_KEY, &self.messages);
        }
        write_value(self.storage.as_mut(), SESSION_ID_KEY, &self.session_id);
    }
}

/// Serialize and store; failures are logged and otherwise ignored so play
/// continues without persistence.
fn write_value<T: Serialize + ?Sized>(storage: &mut dyn Storage, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(PersistError::from)
        .and_then(|raw| storage.set(key, &raw));
    if let Err(e) = result {
        tracing::warn!(key, error = %e, "Failed to persist");
    }
}
