//! Pull pipeline for aerosync
//!
//! Applies remote changes to the local image in dependency order.
//!
//! # Design Principles
//!
//! - Deletions children first, modifications parents first
//! - Records that cannot land yet are staged, never dropped
//! - A page and its change token commit together
//! - Nothing applied here is captured as a local change

mod apply;
mod pipeline;

pub use apply::{apply_deletion, apply_record, retry_staged, ApplyOutcome};
pub use pipeline::{PullPipeline, PullReport};
