//! Remote store interface
//!
//! The engine talks to each remote database through `RemoteStore`. Wire
//! format, transport and authentication stay behind the trait.
//!
//! # Design Principles
//!
//! - Async calls return boxed futures so the trait stays object safe
//! - Batch results are per identity; one bad record never fails the batch
//! - Every error code maps to exactly one `ErrorClass`

mod errors;
mod memory;
mod store;
mod types;

pub use errors::{ErrorClass, RemoteError, RemoteErrorCode, RemoteResult};
pub use memory::MemoryRemoteStore;
pub use store::{RemoteFuture, RemoteStore};
pub use types::{
    AccountStatus, ChangeToken, FetchedChanges, RecordDelete, RecordSave, SubmitBatch,
    SubmitOutcome,
};
