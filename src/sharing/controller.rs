//! Share creation, removal and acceptance
//!
//! Every precondition is checked against local state before a remote call
//! is made. The share itself reaches the remote with the root record's next
//! save: attaching or clearing a handle queues that save.

use super::errors::{SharingError, SharingResult};
use crate::local::LocalDatabase;
use crate::metadata::{PendingKind, SyncMetadata};
use crate::observability::{log_event_with_fields, Event};
use crate::record::{Partition, RecordIdentity, ShareHandle, ShareMetadata, ZoneId};
use crate::remote::RemoteStore;
use crate::schema::SchemaRegistry;

/// Share operations over one local database
pub struct SharingController<'a> {
    db: &'a LocalDatabase,
    registry: &'a SchemaRegistry,
}

impl<'a> SharingController<'a> {
    /// Controller over a database and its registered tables
    pub fn new(db: &'a LocalDatabase, registry: &'a SchemaRegistry) -> Self {
        Self { db, registry }
    }

    /// Check that a row may be shared, returning its metadata
    pub fn check_shareable(&self, table: &str, primary_key: &str) -> SharingResult<SyncMetadata> {
        let sync_table = self
            .registry
            .table(table)
            .ok_or_else(|| SharingError::UnknownTable(table.to_string()))?;
        if !sync_table.is_shareable() {
            return Err(SharingError::PrivateTable(table.to_string()));
        }
        if !sync_table.schema.is_root() {
            return Err(SharingError::MustBeRoot(table.to_string()));
        }

        let identity = RecordIdentity::new(table, primary_key);
        self.db.read(|state| {
            if !state.has_row(&identity) {
                return Err(SharingError::RecordNotFound(identity.clone()));
            }
            let meta = match state.sync.metadata.get(&identity) {
                Some(meta) if meta.is_synced() => meta,
                _ => return Err(SharingError::NotSynchronized(identity.clone())),
            };
            if meta.partition != Partition::Private {
                return Err(SharingError::NotOwner(identity.clone()));
            }
            Ok(meta.clone())
        })
    }

    /// Share a root row, reusing its existing handle
    pub async fn share(
        &self,
        remote: &dyn RemoteStore,
        table: &str,
        primary_key: &str,
    ) -> SharingResult<ShareHandle> {
        let meta = self.check_shareable(table, primary_key)?;
        if let Some(handle) = meta.share {
            return Ok(handle);
        }

        let handle = remote
            .create_share(meta.identity.clone(), meta.zone.clone())
            .await?;

        let identity = meta.identity;
        self.db.transaction(|state| {
            let entry = state
                .sync
                .metadata
                .get_mut(&identity)
                .ok_or_else(|| SharingError::RecordNotFound(identity.clone()))?;
            entry.share = Some(handle.clone());
            state.sync.pending.enqueue(identity.clone(), PendingKind::Save);
            Ok::<_, SharingError>(())
        })?;

        log_event_with_fields(
            Event::ShareCreated,
            &[
                ("record", identity.record_name().as_str()),
                ("share_id", handle.id.to_string().as_str()),
            ],
        );
        Ok(handle)
    }

    /// Detach the share from a root row, returning the removed handle
    pub fn stop_sharing(&self, identity: &RecordIdentity) -> SharingResult<ShareHandle> {
        let handle = self.db.transaction(|state| {
            let entry = state
                .sync
                .metadata
                .get_mut(identity)
                .ok_or_else(|| SharingError::RecordNotFound(identity.clone()))?;
            let handle = entry
                .share
                .take()
                .ok_or_else(|| SharingError::NotShared(identity.clone()))?;
            state.sync.pending.enqueue(identity.clone(), PendingKind::Save);
            Ok::<_, SharingError>(handle)
        })?;

        log_event_with_fields(
            Event::ShareRemoved,
            &[
                ("record", identity.record_name().as_str()),
                ("share_id", handle.id.to_string().as_str()),
            ],
        );
        Ok(handle)
    }

    /// Accept another user's share on the shared remote
    pub async fn accept_share(
        &self,
        remote: &dyn RemoteStore,
        metadata: ShareMetadata,
    ) -> SharingResult<ZoneId> {
        let zone = remote.accept_share(metadata.clone()).await?;

        self.db.transaction(|state| {
            let accepted = &mut state.sync.accepted_shares;
            accepted.retain(|s| s.share_id != metadata.share_id);
            accepted.push(ShareMetadata {
                zone: zone.clone(),
                ..metadata.clone()
            });
            Ok::<_, SharingError>(())
        })?;

        log_event_with_fields(
            Event::ShareAccepted,
            &[
                ("share_id", metadata.share_id.to_string().as_str()),
                ("zone", zone.name.as_str()),
            ],
        );
        Ok(zone)
    }
}
