//! Sharing for aerosync
//!
//! A share is attached to a root record of a shareable table and covers the
//! record's whole hierarchy.
//!
//! # Design Principles
//!
//! - Preconditions are local checks, made before any remote call
//! - Share changes travel with the root record's next save
//! - Read-only hierarchies reject local writes before commit

mod controller;
mod errors;
mod permission;

pub use controller::SharingController;
pub use errors::{SharingError, SharingResult};
pub use permission::read_only_share;
