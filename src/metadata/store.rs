//! Metadata store keyed by record identity

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::SyncMetadata;
use crate::record::{Partition, RecordIdentity, ZoneId};

/// All sync metadata, one entry per synchronized row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore {
    entries: BTreeMap<RecordIdentity, SyncMetadata>,
}

impl MetadataStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for an identity
    pub fn get(&self, identity: &RecordIdentity) -> Option<&SyncMetadata> {
        self.entries.get(identity)
    }

    /// Mutable entry for an identity
    pub fn get_mut(&mut self, identity: &RecordIdentity) -> Option<&mut SyncMetadata> {
        self.entries.get_mut(identity)
    }

    /// Whether an entry exists
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Insert or replace an entry
    pub fn upsert(&mut self, entry: SyncMetadata) {
        self.entries.insert(entry.identity.clone(), entry);
    }

    /// Remove an entry
    pub fn remove(&mut self, identity: &RecordIdentity) -> Option<SyncMetadata> {
        self.entries.remove(identity)
    }

    /// Entry for an identity, created with `default` when missing
    pub fn get_or_insert_with<F>(&mut self, identity: &RecordIdentity, default: F) -> &mut SyncMetadata
    where
        F: FnOnce() -> SyncMetadata,
    {
        self.entries.entry(identity.clone()).or_insert_with(default)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in identity order
    pub fn iter(&self) -> impl Iterator<Item = &SyncMetadata> {
        self.entries.values()
    }

    /// All entries, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SyncMetadata> {
        self.entries.values_mut()
    }

    /// Identities whose parent is `identity`
    pub fn children_of(&self, identity: &RecordIdentity) -> Vec<RecordIdentity> {
        self.entries
            .values()
            .filter(|m| m.parent.as_ref() == Some(identity))
            .map(|m| m.identity.clone())
            .collect()
    }

    /// Root of the hierarchy containing `identity`
    ///
    /// Walks parent links while they resolve to known entries. The walk is
    /// bounded by the store size so a corrupted chain cannot loop.
    pub fn root_of(&self, identity: &RecordIdentity) -> RecordIdentity {
        let mut current = identity.clone();
        for _ in 0..=self.entries.len() {
            match self.entries.get(&current).and_then(|m| m.parent.clone()) {
                Some(parent) if self.entries.contains_key(&parent) => current = parent,
                _ => break,
            }
        }
        current
    }

    /// Identities of records stored in `zone`
    pub fn in_zone(&self, zone: &ZoneId) -> Vec<RecordIdentity> {
        self.entries
            .values()
            .filter(|m| &m.zone == zone)
            .map(|m| m.identity.clone())
            .collect()
    }

    /// Number of entries in a partition
    pub fn count_in(&self, partition: Partition) -> usize {
        self.entries
            .values()
            .filter(|m| m.partition == partition)
            .count()
    }
}
