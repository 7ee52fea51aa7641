//! Remote error taxonomy
//!
//! Every code the remote store can return maps to exactly one class, and
//! the push and pull pipelines act on the class only.

use std::fmt;

use thiserror::Error;

/// Error codes returned by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorCode {
    /// No network
    NetworkUnavailable,
    /// Throttled; retry after the given delay if known
    RateLimited { retry_after_ms: Option<u64> },
    /// Zone locked by another operation
    ZoneBusy,
    /// Service down
    ServiceUnavailable,
    /// Zone does not exist
    ZoneNotFound,
    /// Record does not exist
    UnknownItem,
    /// Parent record missing on the server
    ReferenceViolation,
    /// Caller may not write this record
    PermissionFailure,
    /// Storage quota exhausted
    QuotaExceeded,
    /// Malformed request
    InvalidArguments,
    /// No signed-in account
    NotAuthenticated,
    /// Unexpected server failure
    Internal,
}

/// How the engine reacts to an error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Keep pending and retry with backoff
    Transient,
    /// Parent missing remotely
    Referential,
    /// Remote refused the write
    Permission,
    /// Keep pending, do not retry this cycle
    Quota,
    /// Drop the change
    Invalid,
    /// Create the zone, then retry
    ZoneMissing,
    /// Record gone remotely
    UnknownItem,
    /// Stop the cycle
    Fatal,
}

impl RemoteErrorCode {
    /// Classify the code
    pub fn classify(&self) -> ErrorClass {
        match self {
            RemoteErrorCode::NetworkUnavailable
            | RemoteErrorCode::RateLimited { .. }
            | RemoteErrorCode::ZoneBusy
            | RemoteErrorCode::ServiceUnavailable
            | RemoteErrorCode::Internal => ErrorClass::Transient,
            RemoteErrorCode::ZoneNotFound => ErrorClass::ZoneMissing,
            RemoteErrorCode::UnknownItem => ErrorClass::UnknownItem,
            RemoteErrorCode::ReferenceViolation => ErrorClass::Referential,
            RemoteErrorCode::PermissionFailure => ErrorClass::Permission,
            RemoteErrorCode::QuotaExceeded => ErrorClass::Quota,
            RemoteErrorCode::InvalidArguments => ErrorClass::Invalid,
            RemoteErrorCode::NotAuthenticated => ErrorClass::Fatal,
        }
    }

    /// Whether the code is retryable
    pub fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }

    /// Server-suggested delay before retrying
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            RemoteErrorCode::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            RemoteErrorCode::NetworkUnavailable => "REMOTE_NETWORK_UNAVAILABLE",
            RemoteErrorCode::RateLimited { .. } => "REMOTE_RATE_LIMITED",
            RemoteErrorCode::ZoneBusy => "REMOTE_ZONE_BUSY",
            RemoteErrorCode::ServiceUnavailable => "REMOTE_SERVICE_UNAVAILABLE",
            RemoteErrorCode::ZoneNotFound => "REMOTE_ZONE_NOT_FOUND",
            RemoteErrorCode::UnknownItem => "REMOTE_UNKNOWN_ITEM",
            RemoteErrorCode::ReferenceViolation => "REMOTE_REFERENCE_VIOLATION",
            RemoteErrorCode::PermissionFailure => "REMOTE_PERMISSION_FAILURE",
            RemoteErrorCode::QuotaExceeded => "REMOTE_QUOTA_EXCEEDED",
            RemoteErrorCode::InvalidArguments => "REMOTE_INVALID_ARGUMENTS",
            RemoteErrorCode::NotAuthenticated => "REMOTE_NOT_AUTHENTICATED",
            RemoteErrorCode::Internal => "REMOTE_INTERNAL",
        }
    }
}

impl fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A failed remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Error code
    pub code: RemoteErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl RemoteError {
    /// Create an error
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        self.code.classify()
    }

    /// Whether the call may be retried
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}
