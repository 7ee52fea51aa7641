//! Local database for aerosync
//!
//! Named tables of JSON-valued rows, with the sync store kept alongside in
//! the same image.
//!
//! # Design Principles
//!
//! - One mutex over the whole state; transactions are copy-on-write
//! - A commit is durable before it is visible
//! - Rows only change through a `WriteSession`
//! - Checksum failures on load are fatal

mod database;
mod errors;
mod persistence;
mod session;
mod state;
mod writer;

pub use database::LocalDatabase;
pub use errors::{
    Severity, StorageError, StorageErrorCode, StorageResult, WriteError, WriteResult,
};
pub use persistence::{StateFile, STATE_FILE_NAME};
pub use session::WriteSession;
pub use state::{DatabaseState, PartitionTokens, SyncState, TableData};
pub use writer::SyncedDatabase;
