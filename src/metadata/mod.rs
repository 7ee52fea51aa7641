//! Metadata store for aerosync
//!
//! Everything the engine knows about the remote side of each row lives
//! here, inside the same local transaction as the row itself.
//!
//! # Design Principles
//!
//! - Exactly one metadata entry per synchronized row
//! - Remote baselines are explicit snapshots, never opaque blobs
//! - The pending queue holds at most one change per identity
//! - Records that cannot be applied yet are staged, never dropped

mod entry;
mod pending;
mod staged;
mod store;
mod verify;

pub use entry::SyncMetadata;
pub use pending::{PendingChange, PendingKind, PendingQueue};
pub use staged::{StageReason, StagedRecord, StagedRecords};
pub use store::MetadataStore;
pub use verify::{verify, Inconsistency};
