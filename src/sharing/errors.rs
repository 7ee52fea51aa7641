//! Sharing errors

use thiserror::Error;

use crate::local::StorageError;
use crate::record::RecordIdentity;
use crate::remote::RemoteError;

/// Result type for sharing operations
pub type SharingResult<T> = Result<T, SharingError>;

/// Why a share operation was refused or failed
#[derive(Debug, Error)]
pub enum SharingError {
    /// Table is not registered
    #[error("table '{0}' is not synchronized")]
    UnknownTable(String),

    /// Table is registered as private
    #[error("table '{0}' is not shareable")]
    PrivateTable(String),

    /// Table has a foreign key, so its rows are never hierarchy roots
    #[error("rows of '{0}' are not hierarchy roots")]
    MustBeRoot(String),

    /// No local row
    #[error("no row {0}")]
    RecordNotFound(RecordIdentity),

    /// Row has never been acknowledged by the remote
    #[error("{0} has not been synchronized yet")]
    NotSynchronized(RecordIdentity),

    /// Row lives in another user's share
    #[error("{0} belongs to a share owned by another user")]
    NotOwner(RecordIdentity),

    /// Row carries no share
    #[error("{0} is not shared")]
    NotShared(RecordIdentity),

    /// Remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local commit failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SharingError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SharingError::UnknownTable(_) => "SYNC_SHARE_UNKNOWN_TABLE",
            SharingError::PrivateTable(_) => "SYNC_SHARE_PRIVATE_TABLE",
            SharingError::MustBeRoot(_) => "SYNC_SHARE_MUST_BE_ROOT",
            SharingError::RecordNotFound(_) => "SYNC_SHARE_RECORD_NOT_FOUND",
            SharingError::NotSynchronized(_) => "SYNC_SHARE_NOT_SYNCHRONIZED",
            SharingError::NotOwner(_) => "SYNC_SHARE_NOT_OWNER",
            SharingError::NotShared(_) => "SYNC_SHARE_NOT_SHARED",
            SharingError::Remote(e) => e.code.code(),
            SharingError::Storage(e) => e.code().code(),
        }
    }
}
