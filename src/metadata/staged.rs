//! Staged remote records
//!
//! A fetched record that cannot be applied yet, because its parent has not
//! arrived or its table is not registered, is kept here and retried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{Partition, RecordIdentity, RemoteRecord};

/// Why a record could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parent", rename_all = "snake_case")]
pub enum StageReason {
    /// The parent row does not exist locally
    MissingParent(RecordIdentity),
    /// The record's table is not registered
    UnknownTable,
}

/// A record waiting to be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// The fetched record
    pub record: RemoteRecord,
    /// Partition it was fetched from
    pub partition: Partition,
    /// Why it is staged
    pub reason: StageReason,
    /// How many times applying it was attempted
    pub attempts: u32,
}

/// Staged records keyed by identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagedRecords {
    entries: BTreeMap<RecordIdentity, StagedRecord>,
}

impl StagedRecords {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record, replacing an older version of it
    pub fn stage(&mut self, record: RemoteRecord, partition: Partition, reason: StageReason) {
        let identity = record.identity().clone();
        let attempts = self
            .entries
            .get(&identity)
            .map(|s| s.attempts + 1)
            .unwrap_or(1);
        self.entries.insert(
            identity,
            StagedRecord {
                record,
                partition,
                reason,
                attempts,
            },
        );
    }

    /// Drop a staged record
    pub fn remove(&mut self, identity: &RecordIdentity) -> Option<StagedRecord> {
        self.entries.remove(identity)
    }

    /// Whether a record is staged
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Staged record for an identity
    pub fn get(&self, identity: &RecordIdentity) -> Option<&StagedRecord> {
        self.entries.get(identity)
    }

    /// Remove and return every record staged for a partition
    pub fn take_partition(&mut self, partition: Partition) -> Vec<StagedRecord> {
        self.take_where(|s| s.partition == partition)
    }

    /// Remove and return records staged because `table` was unknown
    pub fn take_unknown_table(&mut self, table: &str) -> Vec<StagedRecord> {
        self.take_where(|s| s.reason == StageReason::UnknownTable && s.record.table() == table)
    }

    fn take_where<F>(&mut self, predicate: F) -> Vec<StagedRecord>
    where
        F: Fn(&StagedRecord) -> bool,
    {
        let keys: Vec<RecordIdentity> = self
            .entries
            .iter()
            .filter(|(_, s)| predicate(s))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter_map(|k| self.entries.remove(k)).collect()
    }

    /// Number of staged records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged records in identity order
    pub fn iter(&self) -> impl Iterator<Item = &StagedRecord> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ZoneId;

    fn record(table: &str, pk: &str) -> RemoteRecord {
        RemoteRecord::new(RecordIdentity::new(table, pk), ZoneId::default_zone())
    }

    #[test]
    fn test_restaging_counts_attempts() {
        let mut staged = StagedRecords::new();
        let parent = RecordIdentity::new("lists", "1");
        staged.stage(record("items", "a"), Partition::Private, StageReason::MissingParent(parent.clone()));
        staged.stage(record("items", "a"), Partition::Private, StageReason::MissingParent(parent));
        assert_eq!(staged.len(), 1);
        assert_eq!(staged.get(&RecordIdentity::new("items", "a")).unwrap().attempts, 2);
    }

    #[test]
    fn test_take_by_partition_and_table() {
        let mut staged = StagedRecords::new();
        staged.stage(record("tags", "t"), Partition::Private, StageReason::UnknownTable);
        staged.stage(record("items", "a"), Partition::Shared, StageReason::UnknownTable);

        let shared = staged.take_partition(Partition::Shared);
        assert_eq!(shared.len(), 1);
        assert!(staged.take_unknown_table("items").is_empty());
        assert_eq!(staged.take_unknown_table("tags").len(), 1);
        assert!(staged.is_empty());
    }

    #[test]
    fn test_reason_serialization() {
        let reason = StageReason::MissingParent(RecordIdentity::new("lists", "1"));
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "missing_parent");
        assert_eq!(json["parent"], "1:lists");
    }
}
