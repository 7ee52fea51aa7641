//! Schema registry for aerosync
//!
//! Tables are registered once, at construction, and validated before any
//! sync activity.
//!
//! # Design Principles
//!
//! - Every registered table is synchronized
//! - At most one foreign key per table; it becomes the remote parent link
//! - Setup errors are fatal and never surface mid-cycle
//! - Signatures are cached across restarts to detect drift

mod errors;
mod registry;
mod signature;
mod types;

pub use errors::{SetupError, SetupResult};
pub use registry::{is_valid_table_name, SchemaRegistry, RESERVED_PREFIX};
pub use signature::{RecordTypeSignature, SignatureDiff};
pub use types::{
    ColumnDef, ForeignKeyAction, ForeignKeyDescriptor, SyncTable, TableSchema, TableSharing,
};
