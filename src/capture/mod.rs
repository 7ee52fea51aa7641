//! Change capture for aerosync
//!
//! Every local write to a synchronized table updates its metadata and
//! queues a pending change inside the same transaction. Writes the engine
//! makes while applying remote state run under a remote `WriteContext` and
//! are not captured.

mod context;
mod recorder;

pub use context::{WriteContext, WriteOrigin};
pub use recorder::{forget, record_delete, record_save};
