//! Sync engine settings.
//!
//! Priority (highest first):
//! 1. Environment: `API_BASE_URL`, `SYNC_BATCH_SIZE`, `SYNC_MAX_RETRIES`,
//!    `SYNC_CONFLICT_STRATEGY`
//! 2. `~/.tasksync/config.json`
//! 3. Built-in defaults
//!
//! Unusable values (zero batch size, unparsable numbers) are skipped with a
//! warning so a typo never leaves the engine unconfigured.

use crate::error::{Error, Result};
use crate::sync::{BackoffPolicy, ConflictStrategy, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Settings for one sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root of the remote REST API
    pub api_base_url: String,
    /// Items per batch request
    pub batch_size: usize,
    /// Failures before an item is permanently failed
    pub max_retries: u32,
    /// Bound on one batch request
    pub request_timeout: Duration,
    /// Bound on one health probe
    pub probe_timeout: Duration,
    pub conflict_strategy: ConflictStrategy,
    pub backoff: BackoffPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            conflict_strategy: ConflictStrategy::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// On-disk shape of `config.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    api_base_url: Option<String>,
    batch_size: Option<usize>,
    max_retries: Option<u32>,
    request_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    conflict_strategy: Option<ConflictStrategy>,
    backoff: Option<BackoffPolicy>,
}

impl SyncConfig {
    /// Load from `~/.tasksync/config.json` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path().as_deref(), |key| std::env::var(key).ok())
    }

    /// Load from an optional config file and an environment lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load_from(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path.filter(|p| p.exists()) {
            let content = std::fs::read_to_string(path)?;
            let file: SettingsFile = serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            config.apply_file(file);
        }

        config.apply_env(env);
        Ok(config)
    }

    /// Retry budget and backoff derived from these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
        }
    }

    fn apply_file(&mut self, file: SettingsFile) {
        if let Some(url) = file.api_base_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        match file.batch_size {
            Some(0) => tracing::warn!("Ignoring batch_size 0 in config file"),
            Some(size) => self.batch_size = size,
            None => {}
        }
        match file.max_retries {
            Some(0) => tracing::warn!("Ignoring max_retries 0 in config file"),
            Some(retries) => self.max_retries = retries,
            None => {}
        }
        if let Some(ms) = file.request_timeout_ms.filter(|ms| *ms > 0) {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.probe_timeout_ms.filter(|ms| *ms > 0) {
            self.probe_timeout = Duration::from_millis(ms);
        }
        if let Some(strategy) = file.conflict_strategy {
            self.conflict_strategy = strategy;
        }
        if let Some(backoff) = file.backoff {
            self.backoff = backoff;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("API_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(size) = positive_from_env::<usize>(&env, "SYNC_BATCH_SIZE") {
            self.batch_size = size;
        }
        if let Some(retries) = positive_from_env::<u32>(&env, "SYNC_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(raw) = env("SYNC_CONFLICT_STRATEGY") {
            match ConflictStrategy::parse(&raw) {
                Some(strategy) => self.conflict_strategy = strategy,
                None => tracing::warn!(key = "SYNC_CONFLICT_STRATEGY", value = %raw, "Ignoring invalid setting"),
            }
        }
    }
}

fn positive_from_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid setting");
            None
        }
    }
}

/// Path of the user config file: `~/.tasksync/config.json`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    super::global_tasksync_dir().map(|dir| dir.join("config.json"))
}
