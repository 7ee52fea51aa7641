//! Foreign key emulation for aerosync
//!
//! The remote store only understands a parent link, so referential actions
//! are enforced here on every write, local or remote.
//!
//! # Design Principles
//!
//! - Checks and actions run in the same transaction as the write
//! - CASCADE, RESTRICT, SET NULL and SET DEFAULT on delete and on key update
//! - Remote-origin deletes treat RESTRICT as CASCADE

mod emulator;
mod errors;

pub use emulator::{
    check_references, derive_parent, find_children, find_parent, plan_delete, plan_key_change,
    ChildAction,
};
pub use errors::ForeignKeyViolation;
