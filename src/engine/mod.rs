//! Sync engine for aerosync
//!
//! Owns the local database, one remote store per partition, and the
//! lifecycle that drives push and pull cycles.
//!
//! # Design Principles
//!
//! - Construction validates everything; no remote call before `start`
//! - Local writes always capture, whatever the engine state
//! - One cycle per partition at a time; partitions run concurrently
//! - Transient failures back off and retry; everything else surfaces

mod config;
#[allow(clippy::module_inception)]
mod engine;
mod errors;
mod events;
mod retry;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{CycleReport, EngineState, SyncEngine, SyncReport};
pub use errors::{SyncError, SyncResult};
pub use events::{SyncEvent, ZoneDeletionReason};
pub use retry::RetryPolicy;
