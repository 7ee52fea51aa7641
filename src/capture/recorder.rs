//! Capture of local writes into metadata and the pending queue

use crate::local::SyncState;
use crate::metadata::{PendingKind, SyncMetadata};
use crate::record::{Partition, RecordIdentity, Row, ZoneId};

/// Capture an insert or update
///
/// Advances the logical clock past the row's own clock, stamps every column
/// whose value changed, refreshes the parent link (children follow their
/// parent's zone and partition) and queues a save. Returns the stamp.
pub fn record_save(
    sync: &mut SyncState,
    identity: &RecordIdentity,
    old_row: Option<&Row>,
    new_row: &Row,
    parent: Option<RecordIdentity>,
) -> u64 {
    let placement = parent
        .as_ref()
        .and_then(|p| sync.metadata.get(p))
        .map(|p| (p.zone.clone(), p.partition));

    let meta = sync.metadata.get_or_insert_with(identity, || {
        SyncMetadata::new(identity.clone(), ZoneId::default_zone(), Partition::Private)
    });

    if let Some((zone, partition)) = placement {
        meta.zone = zone;
        meta.partition = partition;
    }
    meta.parent = parent;
    meta.is_deleted_locally = false;

    let stamp = sync.clock.tick(meta.modification_clock);
    meta.modification_clock = stamp;

    for (column, value) in new_row {
        let changed = match old_row {
            Some(old) => old.get(column) != Some(value),
            None => true,
        };
        if changed {
            meta.field_clocks.insert(column.clone(), stamp);
        }
    }

    sync.pending.enqueue(identity.clone(), PendingKind::Save);
    stamp
}

/// Capture a delete
///
/// The entry stays, marked deleted, until the remote confirms.
pub fn record_delete(sync: &mut SyncState, identity: &RecordIdentity) {
    let meta = sync.metadata.get_or_insert_with(identity, || {
        SyncMetadata::new(identity.clone(), ZoneId::default_zone(), Partition::Private)
    });
    meta.is_deleted_locally = true;
    meta.modification_clock = sync.clock.tick(meta.modification_clock);
    sync.pending.enqueue(identity.clone(), PendingKind::Delete);
}

/// Drop every trace of a row the remote already deleted
pub fn forget(sync: &mut SyncState, identity: &RecordIdentity) {
    sync.metadata.remove(identity);
    sync.pending.remove(identity);
    sync.staged.remove(identity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_save_stamps_changed_columns_only() {
        let mut sync = SyncState::default();
        let id = RecordIdentity::new("lists", "1");
        let v1 = row(&[("id", json!(1)), ("title", json!("a")), ("color", json!("red"))]);
        let first = record_save(&mut sync, &id, None, &v1, None);

        let v2 = row(&[("id", json!(1)), ("title", json!("b")), ("color", json!("red"))]);
        let second = record_save(&mut sync, &id, Some(&v1), &v2, None);

        let meta = sync.metadata.get(&id).unwrap();
        assert!(second > first);
        assert_eq!(meta.field_clock("title"), second);
        assert_eq!(meta.field_clock("color"), first);
        assert_eq!(meta.modification_clock, second);
        assert!(sync.pending.has_save(&id));
    }

    #[test]
    fn test_child_inherits_parent_zone() {
        let mut sync = SyncState::default();
        let list = RecordIdentity::new("lists", "1");
        let shared_zone = ZoneId::new("share-zone", "alice");
        let mut parent = SyncMetadata::new(list.clone(), shared_zone.clone(), Partition::Shared);
        parent.modification_clock = 40;
        sync.metadata.upsert(parent);

        let item = RecordIdentity::new("items", "a");
        record_save(&mut sync, &item, None, &row(&[("id", json!("a"))]), Some(list.clone()));
        let meta = sync.metadata.get(&item).unwrap();
        assert_eq!(meta.zone, shared_zone);
        assert_eq!(meta.partition, Partition::Shared);
        assert_eq!(meta.parent, Some(list));
    }

    #[test]
    fn test_delete_marks_and_queues() {
        let mut sync = SyncState::default();
        let id = RecordIdentity::new("lists", "1");
        record_save(&mut sync, &id, None, &row(&[("id", json!(1))]), None);
        record_delete(&mut sync, &id);
        assert!(sync.metadata.get(&id).unwrap().is_deleted_locally);
        assert!(sync.pending.has_delete(&id));
        assert_eq!(sync.pending.len(), 1);

        forget(&mut sync, &id);
        assert!(sync.metadata.get(&id).is_none());
        assert!(sync.pending.is_empty());
    }
}
