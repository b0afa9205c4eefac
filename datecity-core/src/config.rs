//! Session configuration.

use crate::gateway::{CompletionOptions, DetectPolicy, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_URL};
use crate::persist::default_data_dir;
use std::path::PathBuf;

/// Title sent with remote requests so the gateway can attribute traffic.
pub const APP_TITLE: &str = "DateCity";

/// Where turn records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// `conversation_log.jsonl` in the data directory.
    DataDir,
    /// A specific file.
    File(PathBuf),
    Disabled,
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory for the transcript, identity and log. Platform default when unset.
    pub data_dir: Option<PathBuf>,

    /// Local server base URL. `None` skips local detection entirely.
    pub local_url: Option<String>,

    /// Model name sent to the local server.
    pub local_model: String,

    /// Remote gateway base URL.
    pub remote_url: String,

    /// Model requested from the remote gateway.
    pub remote_model: String,

    /// Bearer credential for the remote gateway.
    pub api_key: Option<String>,

    /// `HTTP-Referer` sent to the remote gateway.
    pub referer: Option<String>,

    /// Replaces the built-in system prompt.
    pub custom_prompt: Option<String>,

    pub options: CompletionOptions,

    pub detect: DetectPolicy,

    pub log: LogTarget,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            local_url: Some(DEFAULT_LOCAL_URL.to_string()),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            remote_url: completion::DEFAULT_BASE_URL.to_string(),
            remote_model: completion::DEFAULT_MODEL.to_string(),
            api_key: None,
            referer: None,
            custom_prompt: None,
            options: CompletionOptions::default(),
            detect: DetectPolicy::default(),
            log: LogTarget::DataDir,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables.
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get("OPENROUTER_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(dir) = get("DATECITY_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = get("DATECITY_LOCAL_URL") {
            config.local_url = match url.trim() {
                "off" | "none" => None,
                url => Some(url.to_string()),
            };
        }
        if let Some(model) = get("DATECITY_LOCAL_MODEL") {
            config.local_model = model;
        }
        if let Some(url) = get("DATECITY_REMOTE_URL") {
            config.remote_url = url;
        }
        if let Some(model) = get("DATECITY_MODEL") {
            config.remote_model = model;
        }
        if let Some(referer) = get("DATECITY_REFERER") {
            config.referer = Some(referer);
        }
        if let Some(raw) = get("DATECITY_TEMPERATURE") {
            match raw.trim().parse::<f32>() {
                Ok(t) => config.options.temperature = t,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring DATECITY_TEMPERATURE"),
            }
        }
        if let Some(raw) = get("DATECITY_MAX_TOKENS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.options.max_tokens = n,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring DATECITY_MAX_TOKENS"),
            }
        }
        if let Some(target) = get("DATECITY_LOG") {
            config.log = match target.trim() {
                "off" | "0" | "false" => LogTarget::Disabled,
                path => LogTarget::File(PathBuf::from(path)),
            };
        }

        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_local_url(mut self, url: impl Into<String>) -> Self {
        self.local_url = Some(url.into());
        self
    }

    /// Skip local server detection.
    pub fn without_local(mut self) -> Self {
        self.local_url = None;
        self
    }

    pub fn with_local_model(mut self, model: impl Into<String>) -> Self {
        self.local_model = model.into();
        self
    }

    pub fn with_remote_model(mut self, model: impl Into<String>) -> Self {
        self.remote_model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    pub fn with_detect_policy(mut self, policy: DetectPolicy) -> Self {
        self.detect = policy;
        self
    }

    pub fn with_log(mut self, log: LogTarget) -> Self {
        self.log = log;
        self
    }

    /// The data directory actually used.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// The system prompt actually sent.
    pub fn system_prompt(&self) -> &str {
        self.custom_prompt
            .as_deref()
            .unwrap_or(crate::prompt::SYSTEM_PROMPT)
    }
}
