//! Push pipeline for aerosync
//!
//! Turns pending changes into one batch per round and settles every
//! per-record outcome.
//!
//! # Design Principles
//!
//! - Saves carry only the fields that changed since the last acknowledgement
//! - Conflicts are merged locally and resubmitted, never surfaced
//! - A pending change is only cleared once its outcome is known
//! - Nothing is sent for a change the remote already reflects

mod batch;
mod pipeline;

pub use batch::{build_save, changed_columns, has_local_changes, PlannedChange, PlannedOp};
pub use pipeline::{PushPipeline, PushReport};
