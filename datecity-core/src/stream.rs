//! Folds completion updates into the transcript as they arrive.

use crate::gateway::{GatewayError, StreamUpdate, UpdateStream};
use crate::markers::Cue;
use crate::notify::{Notice, Notifier};
use crate::store::ConversationStore;
use crate::transcript::Message;
use futures::StreamExt;

/// Result of one reconciled reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledTurn {
    /// Concatenation of every fragment applied.
    pub content: String,
    /// Model reported by the backend, if any.
    pub model: Option<String>,
    /// Cues in the order they fired, repeats included.
    pub cues: Vec<Cue>,
}

/// Applies one reply's updates to the store.
///
/// The first non-empty fragment appends a new assistant message and every
/// later fragment extends it, so the persisted transcript always holds the
/// partial reply. The first failure notifies the player and ends the turn;
/// updates after it are ignored.
pub struct StreamReconciler<'a> {
    store: &'a mut ConversationStore,
    notifier: &'a dyn Notifier,
    turn: ReconciledTurn,
    started: bool,
    aborted: bool,
}

impl<'a> StreamReconciler<'a> {
    pub fn new(store: &'a mut ConversationStore, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            notifier,
            turn: ReconciledTurn::default(),
            started: false,
            aborted: false,
        }
    }

    /// Apply one update.
    pub fn apply(&mut self, update: StreamUpdate) -> Result<(), GatewayError> {
        if self.aborted {
            return Ok(());
        }

        match update {
            StreamUpdate::Model(model) => {
                self.turn.model = Some(model);
            }
            StreamUpdate::Fragment(text) => {
                if text.is_empty() {
                    return Ok(());
                }

                for cue in Cue::detect(&text) {
                    self.notifier.cue(cue);
                    self.turn.cues.push(cue);
                }

                if self.started {
                    // Only fails if the last message is gone or not ours,
                    // which nothing else can cause mid-turn.
                    if self.store.extend_last(&text).is_none() {
                        self.store.append(Message::assistant(text.as_str()));
                    }
                } else {
                    self.store.append(Message::assistant(text.as_str()));
                    self.started = true;
                }
                self.turn.content.push_str(&text);
            }
            StreamUpdate::Failed(err) => {
                tracing::warn!(error = %err, partial = self.turn.content.len(), "Completion stream failed");
                self.aborted = true;
                self.notifier.notice(Notice::CompletionFailed(err.to_string()));
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drain `updates` in order, stopping at the first failure.
    pub async fn run(mut self, mut updates: UpdateStream) -> Result<ReconciledTurn, GatewayError> {
        while let Some(update) = updates.next().await {
            self.apply(update)?;
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> ReconciledTurn {
        self.turn
    }
}
