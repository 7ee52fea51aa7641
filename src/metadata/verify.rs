//! Consistency checks over the sync store
//!
//! Used by `aerosync verify` and by tests. Checks:
//! - every row has a metadata entry
//! - every live metadata entry has a row
//! - rows deleted locally still have a pending delete
//! - every pending change has metadata
//! - parent links resolve and stay inside the parent's partition

use std::fmt;

use serde::Serialize;

use crate::local::DatabaseState;
use crate::record::RecordIdentity;

/// A violated consistency rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    /// Row without metadata
    MissingMetadata { identity: RecordIdentity },
    /// Live metadata without a row
    OrphanedMetadata { identity: RecordIdentity },
    /// Soft-deleted entry with no pending delete
    DeleteNotQueued { identity: RecordIdentity },
    /// Pending change without metadata
    PendingWithoutMetadata { identity: RecordIdentity },
    /// Parent link to an unknown record
    DanglingParent {
        identity: RecordIdentity,
        parent: RecordIdentity,
    },
    /// Child stored in another partition than its parent
    PartitionMismatch {
        identity: RecordIdentity,
        parent: RecordIdentity,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::MissingMetadata { identity } => {
                write!(f, "{}: row has no metadata", identity)
            }
            Inconsistency::OrphanedMetadata { identity } => {
                write!(f, "{}: metadata has no row", identity)
            }
            Inconsistency::DeleteNotQueued { identity } => {
                write!(f, "{}: deleted locally but no delete is pending", identity)
            }
            Inconsistency::PendingWithoutMetadata { identity } => {
                write!(f, "{}: pending change has no metadata", identity)
            }
            Inconsistency::DanglingParent { identity, parent } => {
                write!(f, "{}: parent {} is unknown", identity, parent)
            }
            Inconsistency::PartitionMismatch { identity, parent } => {
                write!(f, "{}: partition differs from parent {}", identity, parent)
            }
        }
    }
}

/// Check the state and return every violation found
pub fn verify(state: &DatabaseState) -> Vec<Inconsistency> {
    let mut found = Vec::new();
    let sync = &state.sync;

    for (table, data) in &state.tables {
        for (pk, _) in data.iter() {
            let identity = RecordIdentity::new(table.as_str(), pk.as_str());
            if !sync.metadata.contains(&identity) {
                found.push(Inconsistency::MissingMetadata { identity });
            }
        }
    }

    for meta in sync.metadata.iter() {
        let identity = meta.identity.clone();
        if meta.is_deleted_locally {
            if !sync.pending.has_delete(&identity) {
                found.push(Inconsistency::DeleteNotQueued { identity: identity.clone() });
            }
        } else if !state.has_row(&identity) {
            found.push(Inconsistency::OrphanedMetadata { identity: identity.clone() });
        }

        if let Some(parent) = &meta.parent {
            match sync.metadata.get(parent) {
                None => found.push(Inconsistency::DanglingParent {
                    identity: identity.clone(),
                    parent: parent.clone(),
                }),
                Some(p) if p.partition != meta.partition => {
                    found.push(Inconsistency::PartitionMismatch {
                        identity: identity.clone(),
                        parent: parent.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    for pending in sync.pending.iter() {
        if !sync.metadata.contains(&pending.identity) {
            found.push(Inconsistency::PendingWithoutMetadata {
                identity: pending.identity.clone(),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PendingKind, SyncMetadata};
    use crate::record::{Partition, Row, ZoneId};

    #[test]
    fn test_consistent_state() {
        let mut state = DatabaseState::new();
        let id = RecordIdentity::new("lists", "1");
        state.put_row(&id, Row::new());
        state
            .sync
            .metadata
            .upsert(SyncMetadata::new(id.clone(), ZoneId::default_zone(), Partition::Private));
        state.sync.pending.enqueue(id, PendingKind::Save);
        assert!(verify(&state).is_empty());
    }

    #[test]
    fn test_reports_violations() {
        let mut state = DatabaseState::new();
        let row_only = RecordIdentity::new("lists", "1");
        state.put_row(&row_only, Row::new());

        let mut child = SyncMetadata::new(
            RecordIdentity::new("items", "a"),
            ZoneId::default_zone(),
            Partition::Private,
        );
        child.parent = Some(RecordIdentity::new("lists", "9"));
        child.is_deleted_locally = true;
        state.sync.metadata.upsert(child);
        state
            .sync
            .pending
            .enqueue(RecordIdentity::new("notes", "x"), PendingKind::Save);

        let found = verify(&state);
        assert_eq!(found.len(), 4);
        assert!(found.contains(&Inconsistency::MissingMetadata { identity: row_only }));
        assert!(found
            .iter()
            .any(|i| matches!(i, Inconsistency::DeleteNotQueued { .. })));
        assert!(found
            .iter()
            .any(|i| matches!(i, Inconsistency::DanglingParent { .. })));
        assert!(found
            .iter()
            .any(|i| matches!(i, Inconsistency::PendingWithoutMetadata { .. })));
    }
}
