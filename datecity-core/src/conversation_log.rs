//! Append-only record of every turn, for later review of how the model played.
//!
//! Logging is best-effort: failures are reported through `tracing` and never
//! reach the player.

use crate::store::SessionId;
use crate::transcript::Role;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the log under the data directory.
pub const LOG_FILE: &str = "conversation_log.jsonl";

/// One logged turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub session_id: String,
    pub role: Role,
    pub message: String,
    pub system_prompt: String,
    pub model: String,
    /// Seconds since the Unix epoch.
    pub logged_at: u64,
}

impl LogRecord {
    pub fn new(
        session_id: SessionId,
        role: Role,
        message: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            role,
            message: message.into(),
            system_prompt: system_prompt.into(),
            model: model.into(),
            logged_at: unix_now(),
        }
    }
}

/// Sink for turn records.
pub trait ConversationLog: Send {
    fn record(&mut self, record: LogRecord);
}

/// One JSON object per line, appended to a file.
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log under `dir` with the default file name.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl ConversationLog for JsonlLog {
    fn record(&mut self, record: LogRecord) {
        if let Err(e) = self.append(&record) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to log conversation turn");
        }
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl ConversationLog for NullLog {
    fn record(&mut self, _record: LogRecord) {}
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
