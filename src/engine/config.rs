//! Engine configuration
//!
//! Loaded from a JSON file or built in code. Every field except
//! `container_id` has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{SyncError, SyncResult};
use crate::conflict::MissingClockPolicy;
use crate::observability::{log_event_with_fields, Event, Severity};
use crate::schema::SetupError;

/// Backoff settings for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First delay (default: 500)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any delay (default: 60000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Cycle attempts before giving up (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomize delays (default: true)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote container identifier (required)
    #[serde(default)]
    pub container_id: String,

    /// Directory holding the state file; in-memory when absent
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// How to compare a local edit with a server field lacking a clock
    #[serde(default)]
    pub missing_clock_policy: MissingClockPolicy,

    /// Push rounds spent resolving conflicts per cycle (default: 3)
    #[serde(default = "default_max_conflict_rounds")]
    pub max_conflict_rounds: usize,

    /// Transient failure handling
    #[serde(default)]
    pub retry: RetryConfig,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_conflict_rounds() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SyncConfig {
    /// Config for a container with every other field defaulted
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            data_dir: None,
            missing_clock_policy: MissingClockPolicy::default(),
            max_conflict_rounds: default_max_conflict_rounds(),
            retry: RetryConfig::default(),
            log_level: default_log_level(),
        }
    }

    /// Same config persisting under `dir`
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        let config: SyncConfig = serde_json::from_str(&text)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("container", config.container_id.as_str()),
                ("path", path.display().to_string().as_str()),
            ],
        );
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.container_id.trim().is_empty() {
            return Err(SetupError::MissingContainerIdentity);
        }
        if self.severity().is_none() {
            return Err(SetupError::InvalidConfig(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(SetupError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(SetupError::InvalidConfig(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.log_level)
    }
}
