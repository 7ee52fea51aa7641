//! Local database error types
//!
//! Error codes:
//! - SYNC_STORAGE_IO_ERROR (ERROR severity)
//! - SYNC_STORAGE_WRITE_FAILED (ERROR severity)
//! - SYNC_STORAGE_CORRUPTED (FATAL severity)
//!
//! `WriteError` is what application writes see.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::foreign_key::ForeignKeyViolation;
use crate::record::{RecordIdentity, ZoneId};

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, engine continues
    Error,
    /// State cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Reading the state file failed
    Io,
    /// Writing the state file failed
    WriteFailed,
    /// Header, checksum or payload is invalid
    Corrupted,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::Io => "SYNC_STORAGE_IO_ERROR",
            StorageErrorCode::WriteFailed => "SYNC_STORAGE_WRITE_FAILED",
            StorageErrorCode::Corrupted => "SYNC_STORAGE_CORRUPTED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::Io | StorageErrorCode::WriteFailed => Severity::Error,
            StorageErrorCode::Corrupted => Severity::Fatal,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error with context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl StorageError {
    /// I/O failure while reading
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    /// I/O failure while writing
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::WriteFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Encoding failure while writing
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::WriteFailed,
            message: message.into(),
            source: None,
        }
    }

    /// State file cannot be trusted
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::Corrupted,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the state must not be used
    pub fn is_fatal(&self) -> bool {
        self.code.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for application writes
pub type WriteResult<T> = Result<T, WriteError>;

/// Rejected application write
#[derive(Debug, Error)]
pub enum WriteError {
    /// Table is not registered
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// Column is not part of the table
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// Row has no usable primary key value
    #[error("row for table '{0}' has no usable primary key")]
    MissingPrimaryKey(String),

    /// Insert of an existing row
    #[error("row {0} already exists")]
    DuplicateRow(RecordIdentity),

    /// Update or delete of a missing row
    #[error("row {0} does not exist")]
    RowNotFound(RecordIdentity),

    /// Foreign key constraint failed
    #[error(transparent)]
    ForeignKey(#[from] ForeignKeyViolation),

    /// Hierarchy is shared read-only with the current user
    #[error("write to {identity} denied by read-only share {share_id}")]
    PermissionDenied {
        identity: RecordIdentity,
        share_id: uuid::Uuid,
    },

    /// Synced row would move to a parent in another zone
    #[error("{identity} lives in zone {from} and cannot move under a parent in zone {to}")]
    ZoneChange {
        identity: RecordIdentity,
        from: ZoneId,
        to: ZoneId,
    },

    /// Durable commit failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WriteError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            WriteError::UnknownTable(_) => "SYNC_WRITE_UNKNOWN_TABLE",
            WriteError::UnknownColumn { .. } => "SYNC_WRITE_UNKNOWN_COLUMN",
            WriteError::MissingPrimaryKey(_) => "SYNC_WRITE_MISSING_PRIMARY_KEY",
            WriteError::DuplicateRow(_) => "SYNC_WRITE_DUPLICATE_ROW",
            WriteError::RowNotFound(_) => "SYNC_WRITE_ROW_NOT_FOUND",
            WriteError::ForeignKey(v) => v.code(),
            WriteError::PermissionDenied { .. } => "SYNC_WRITE_PERMISSION_DENIED",
            WriteError::ZoneChange { .. } => "SYNC_WRITE_ZONE_CHANGE",
            WriteError::Storage(e) => e.code().code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_is_fatal() {
        let err = StorageError::corrupted("checksum mismatch");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "[FATAL] SYNC_STORAGE_CORRUPTED: checksum mismatch"
        );
    }

    #[test]
    fn test_write_error_wraps_storage() {
        let err: WriteError = StorageError::encode_failed("boom").into();
        assert_eq!(err.code(), "SYNC_STORAGE_WRITE_FAILED");
    }
}
