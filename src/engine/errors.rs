//! Engine error type
//!
//! Wraps the subsystem errors so callers of the engine see one type, each
//! variant keeping its stable code.

use std::time::Duration;

use thiserror::Error;

use crate::local::{StorageError, WriteError};
use crate::remote::{AccountStatus, RemoteError};
use crate::schema::SetupError;
use crate::sharing::SharingError;

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine failures
#[derive(Debug, Error)]
pub enum SyncError {
    /// Construction-time validation failed
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Local persistence failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A local write was rejected
    #[error(transparent)]
    Write(#[from] WriteError),

    /// A remote call failed as a whole
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A share operation failed
    #[error(transparent)]
    Sharing(#[from] SharingError),

    /// Configuration file unreadable or malformed
    #[error("config error: {0}")]
    Config(String),

    /// Engine is not running
    #[error("engine is not running")]
    Stopped,

    /// Remote account cannot be used
    #[error("account unavailable: {}", .0.as_str())]
    AccountUnavailable(AccountStatus),
}

impl SyncError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Setup(e) => e.code(),
            SyncError::Storage(e) => e.code().code(),
            SyncError::Write(e) => e.code(),
            SyncError::Remote(e) => e.code.code(),
            SyncError::Sharing(e) => e.code(),
            SyncError::Config(_) => "SYNC_CONFIG_ERROR",
            SyncError::Stopped => "SYNC_ENGINE_STOPPED",
            SyncError::AccountUnavailable(_) => "SYNC_ACCOUNT_UNAVAILABLE",
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Sharing(SharingError::Remote(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Delay the remote asked for before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Remote(e) => e.code.retry_after_ms().map(Duration::from_millis),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorCode;

    #[test]
    fn test_transient_classification() {
        let err: SyncError = RemoteError::new(RemoteErrorCode::ZoneBusy, "busy").into();
        assert!(err.is_transient());
        assert_eq!(err.code(), "REMOTE_ZONE_BUSY");

        let err: SyncError = RemoteError::new(RemoteErrorCode::InvalidArguments, "bad").into();
        assert!(!err.is_transient());
        assert!(!SyncError::Stopped.is_transient());
    }

    #[test]
    fn test_retry_after() {
        let err: SyncError = RemoteError::new(
            RemoteErrorCode::RateLimited {
                retry_after_ms: Some(1500),
            },
            "slow down",
        )
        .into();
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_setup_codes_pass_through() {
        let err: SyncError = SetupError::MissingContainerIdentity.into();
        assert_eq!(err.code(), "SYNC_SETUP_MISSING_CONTAINER");
    }
}
