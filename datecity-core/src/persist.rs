//! Durable key/value storage for the transcript and session identity.
//!
//! Values are opaque strings (the store writes JSON). Each key lives in its
//! own file under the data directory so a write replaces exactly one value.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Directory name under the platform data dir.
const APP_DIR: &str = "datecity";

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A string-keyed store that survives restarts.
pub trait Storage: Send {
    /// Read a value; `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Replace a value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Whether values outlive the process.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Default data directory: `<platform data dir>/datecity`, falling back to
/// `./.datecity` when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".datecity"))
}

/// Open file storage at `dir`, or in-memory storage if the directory cannot
/// be created. The game stays playable either way; only resume is lost.
pub fn open_storage(dir: impl AsRef<Path>) -> Box<dyn Storage> {
    let dir = dir.as_ref();
    match FileStorage::open(dir) {
        Ok(storage) => {
            tracing::debug!(dir = %dir.display(), "Opened file storage");
            Box::new(storage)
        }
        Err(e) => {
            tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "Storage unavailable, progress will not be saved"
            );
            Box::new(MemoryStorage::new())
        }
    }
}

/// One JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.key_path(key);
        // Write then rename so a crash never leaves half a transcript behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local storage.
///
/// Clones share the same map, so a test can keep a handle after giving the
/// storage to a store and inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `key` has been written.
    pub fn write_count(&self, key: &str) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }

    /// Current value of `key`, bypassing the trait.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.peek(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut inner = self.lock();
        inner.values.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_default() += 1;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
