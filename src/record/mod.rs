//! Record model shared by every sync subsystem
//!
//! A synchronized local row and its remote counterpart are joined by a
//! `RecordIdentity`. The remote side is described twice, explicitly:
//!
//! - `SystemFields`: identity, zone, change tag and parent. This is the
//!   optimistic-concurrency header sent with every save.
//! - `RemoteRecord`: system fields plus every field value with its own
//!   logical clock. This is the merge baseline.

mod clock;
mod identity;
mod representation;
mod share;
mod zone;

pub use clock::LogicalClock;
pub use identity::{primary_key_string, primary_key_value, IdentityParseError, RecordIdentity};
pub use representation::{ChangeTag, FieldValue, RemoteRecord, Row, SystemFields};
pub use share::{ShareHandle, ShareMetadata, SharePermission};
pub use zone::{Partition, ZoneId};
