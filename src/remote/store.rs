//! The remote store seam

use std::future::Future;
use std::pin::Pin;

use super::errors::RemoteResult;
use super::types::{AccountStatus, ChangeToken, FetchedChanges, SubmitBatch, SubmitOutcome};
use crate::record::{RecordIdentity, RemoteRecord, ShareHandle, ShareMetadata, ZoneId};

/// Boxed future returned by remote calls
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// One remote database (private or shared)
///
/// Implementations own transport, authentication and wire format. Every
/// call may fail with a `RemoteError`; `submit_batch` additionally reports
/// per-identity outcomes.
pub trait RemoteStore: Send + Sync {
    /// Current account state
    fn account_status(&self) -> RemoteFuture<'_, AccountStatus>;

    /// Create a zone; creating an existing zone succeeds
    fn create_zone(&self, zone: ZoneId) -> RemoteFuture<'_, ()>;

    /// Delete a zone and everything in it
    fn delete_zone(&self, zone: ZoneId) -> RemoteFuture<'_, ()>;

    /// Changes since `since`, or everything when `None`
    fn fetch_changes(&self, since: Option<ChangeToken>) -> RemoteFuture<'_, FetchedChanges>;

    /// Current version of specific records
    fn fetch_records(
        &self,
        identities: Vec<RecordIdentity>,
    ) -> RemoteFuture<'_, Vec<(RecordIdentity, Option<RemoteRecord>)>>;

    /// Submit saves and deletes
    fn submit_batch(
        &self,
        batch: SubmitBatch,
    ) -> RemoteFuture<'_, Vec<(RecordIdentity, SubmitOutcome)>>;

    /// Create a share rooted at a record
    fn create_share(&self, root: RecordIdentity, zone: ZoneId) -> RemoteFuture<'_, ShareHandle>;

    /// Accept a share offered by another user
    fn accept_share(&self, metadata: ShareMetadata) -> RemoteFuture<'_, ZoneId>;
}
