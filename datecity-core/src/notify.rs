//! Side-channel feedback to the player: sound cues and one-off notices.

use crate::markers::Cue;

/// Something the player should be told outside the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A local model server answered the availability probe.
    LocalProviderDetected,
    /// No local model server answered in time.
    InstallLocalProvider,
    /// Neither a local nor a remote backend can serve completions.
    BackendUnavailable,
    /// A completion request or stream failed.
    CompletionFailed(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::LocalProviderDetected => {
                write!(f, "Local model server detected, completions stay on this machine")
            }
            Notice::InstallLocalProvider => write!(
                f,
                "No local model server found. Run one (e.g. LM Studio on port 1234) to play offline"
            ),
            Notice::BackendUnavailable => write!(
                f,
                "No completion backend available. Start a local model server or set OPENROUTER_API_KEY"
            ),
            Notice::CompletionFailed(reason) => write!(f, "Completion failed: {reason}"),
        }
    }
}

/// Receives cues and notices as they happen.
///
/// Cues may fire several times per turn, once per fragment that carries one.
pub trait Notifier: Send + Sync {
    fn cue(&self, cue: Cue);
    fn notice(&self, notice: Notice);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn cue(&self, _cue: Cue) {}
    fn notice(&self, _notice: Notice) {}
}
