//! aerosync - keeps a local relational store in sync with a zone-partitioned,
//! hierarchical remote record store.
//!
//! # Layout
//!
//! - `record`: identities, zones, remote record snapshots, logical clock
//! - `schema` / `ordering`: table registry, setup validation, dependency order
//! - `metadata`: per-row sync metadata, pending queue, staged records
//! - `local`: transactional local store and the write-interception layer
//! - `capture` / `foreign_key`: change capture and foreign-key emulation
//! - `conflict`: field-level merge
//! - `remote`: the `RemoteStore` seam and an in-memory implementation
//! - `push` / `pull` / `reconcile` / `sharing`: the sync pipelines
//! - `engine`: lifecycle, partitions, event dispatch, configuration

pub mod capture;
pub mod cli;
pub mod conflict;
pub mod engine;
pub mod foreign_key;
pub mod local;
pub mod metadata;
pub mod observability;
pub mod ordering;
pub mod pull;
pub mod push;
pub mod reconcile;
pub mod record;
pub mod remote;
pub mod schema;
pub mod sharing;

pub use engine::{EngineState, SyncConfig, SyncEngine, SyncError, SyncEvent, SyncReport, SyncResult};
pub use local::{LocalDatabase, SyncedDatabase, WriteError};
pub use record::{RecordIdentity, Row};
pub use schema::{ForeignKeyAction, ForeignKeyDescriptor, SyncTable, TableSchema};
