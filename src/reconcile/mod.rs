//! Schema reconciliation for aerosync
//!
//! Detects how registered tables changed since the previous run and
//! repairs stored rows before any sync happens.
//!
//! # Design Principles
//!
//! - Drift is detected from cached signatures, never from row contents
//! - Values the remote already holds are restored locally, not re-pushed
//! - Back-fills are written without capture

mod reconciler;

pub use reconciler::{ReconcileReport, SchemaReconciler};
