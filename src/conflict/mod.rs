//! Conflict resolution
//!
//! Conflicts are resolved per field, never per record, and are never
//! surfaced to the application.

mod merge;

pub use merge::{merge, resolve_field, FieldWinner, MergeOutcome, MissingClockPolicy};
