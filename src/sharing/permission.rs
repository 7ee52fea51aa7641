//! Write permission checks for shared hierarchies

use uuid::Uuid;

use crate::local::SyncState;
use crate::record::{RecordIdentity, SharePermission};

/// Read-only share covering a record, if any
///
/// The record's hierarchy root is found through metadata (starting from the
/// parent for rows that have no metadata yet). The hierarchy is read-only
/// when the root carries a read-only share handle, or when its zone belongs
/// to a share accepted read-only.
pub fn read_only_share(
    sync: &SyncState,
    identity: &RecordIdentity,
    parent: Option<&RecordIdentity>,
) -> Option<Uuid> {
    let start = if sync.metadata.contains(identity) {
        identity
    } else {
        parent?
    };
    let root = sync.metadata.root_of(start);
    let root_meta = sync.metadata.get(&root)?;

    if let Some(share) = &root_meta.share {
        if !share.allows_write() {
            return Some(share.id);
        }
    }

    sync.accepted_shares
        .iter()
        .find(|s| s.zone == root_meta.zone && s.permission == SharePermission::ReadOnly)
        .map(|s| s.share_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SyncMetadata;
    use crate::record::{Partition, ShareHandle, ShareMetadata, ZoneId};

    fn shared_state(permission: SharePermission) -> (SyncState, ShareHandle) {
        let mut sync = SyncState::default();
        let zone = ZoneId::new("trip", "alice");
        let root = RecordIdentity::new("lists", "1");
        let mut handle = ShareHandle::owned(root.clone(), zone.clone());
        handle.permission = permission;

        let mut root_meta = SyncMetadata::new(root.clone(), zone.clone(), Partition::Shared);
        root_meta.share = Some(handle.clone());
        sync.metadata.upsert(root_meta);

        let mut child = SyncMetadata::new(RecordIdentity::new("items", "a"), zone, Partition::Shared);
        child.parent = Some(root);
        sync.metadata.upsert(child);
        (sync, handle)
    }

    #[test]
    fn test_read_only_root_covers_children() {
        let (sync, handle) = shared_state(SharePermission::ReadOnly);
        let child = RecordIdentity::new("items", "a");
        assert_eq!(read_only_share(&sync, &child, None), Some(handle.id));

        let new_child = RecordIdentity::new("items", "b");
        let root = RecordIdentity::new("lists", "1");
        assert_eq!(read_only_share(&sync, &new_child, Some(&root)), Some(handle.id));
    }

    #[test]
    fn test_writable_share_allows() {
        let (sync, _) = shared_state(SharePermission::ReadWrite);
        assert_eq!(read_only_share(&sync, &RecordIdentity::new("items", "a"), None), None);
    }

    #[test]
    fn test_accepted_read_only_zone() {
        let (mut sync, handle) = shared_state(SharePermission::ReadWrite);
        sync.accepted_shares.push(ShareMetadata {
            share_id: handle.id,
            root: handle.root.clone(),
            zone: handle.zone.clone(),
            permission: SharePermission::ReadOnly,
        });
        assert!(read_only_share(&sync, &RecordIdentity::new("items", "a"), None).is_some());
    }

    #[test]
    fn test_unshared_rows_are_writable() {
        let sync = SyncState::default();
        assert_eq!(read_only_share(&sync, &RecordIdentity::new("lists", "9"), None), None);
    }
}
