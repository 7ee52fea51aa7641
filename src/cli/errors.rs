//! CLI-specific error types

use std::fmt;
use std::io;

use crate::engine::SyncError;
use crate::local::StorageError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// No state file in the data directory
    NotInitialized,
    /// State file unreadable
    StorageError,
    /// Verification found problems
    Inconsistent,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SYNC_CLI_CONFIG_ERROR",
            Self::IoError => "SYNC_CLI_IO_ERROR",
            Self::NotInitialized => "SYNC_CLI_NOT_INITIALIZED",
            Self::StorageError => "SYNC_CLI_STORAGE_ERROR",
            Self::Inconsistent => "SYNC_CLI_INCONSISTENT",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Not initialized
    pub fn not_initialized(dir: &std::path::Path) -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            format!("No sync state in {}", dir.display()),
        )
    }

    /// Verification failed
    pub fn inconsistent(count: usize) -> Self {
        Self::new(
            CliErrorCode::Inconsistent,
            format!("{} inconsistencies found", count),
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::new(CliErrorCode::StorageError, e.to_string())
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Storage(e) => e.into(),
            other => Self::config_error(other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::inconsistent(2);
        assert_eq!(err.to_string(), "SYNC_CLI_INCONSISTENT: 2 inconsistencies found");
    }

    #[test]
    fn test_config_sync_error_maps_to_config_code() {
        let err: CliError = SyncError::Config("bad".into()).into();
        assert_eq!(err.code_str(), "SYNC_CLI_CONFIG_ERROR");
    }
}
