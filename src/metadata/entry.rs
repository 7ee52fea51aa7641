//! Per-row sync metadata

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{
    ChangeTag, Partition, RecordIdentity, RemoteRecord, ShareHandle, SystemFields, ZoneId,
};

/// Sync bookkeeping for one synchronized local row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Identity of the row and its remote record
    pub identity: RecordIdentity,
    /// Zone the record lives in
    pub zone: ZoneId,
    /// Remote database the record belongs to
    pub partition: Partition,
    /// Parent record, derived from the row's foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordIdentity>,
    /// Last acknowledged system fields (optimistic-concurrency baseline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_system_fields: Option<SystemFields>,
    /// Last acknowledged full record (merge baseline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_snapshot: Option<RemoteRecord>,
    /// Logical clock of the last write to the row
    pub modification_clock: u64,
    /// Logical clock of the last write to each column
    #[serde(default)]
    pub field_clocks: BTreeMap<String, u64>,
    /// Share attached to this root record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareHandle>,
    /// Deleted locally, delete not yet confirmed by the remote
    #[serde(default)]
    pub is_deleted_locally: bool,
}

impl SyncMetadata {
    /// Metadata for a row that has never been synchronized
    pub fn new(identity: RecordIdentity, zone: ZoneId, partition: Partition) -> Self {
        Self {
            identity,
            zone,
            partition,
            parent: None,
            last_known_system_fields: None,
            last_known_snapshot: None,
            modification_clock: 0,
            field_clocks: BTreeMap::new(),
            share: None,
            is_deleted_locally: false,
        }
    }

    /// Whether the remote has acknowledged this record at least once
    pub fn is_synced(&self) -> bool {
        self.last_known_snapshot.is_some()
    }

    /// Change tag of the last acknowledged version
    pub fn change_tag(&self) -> Option<&ChangeTag> {
        self.last_known_system_fields
            .as_ref()
            .and_then(|s| s.change_tag.as_ref())
    }

    /// Clock of a column, zero when never written
    pub fn field_clock(&self, column: &str) -> u64 {
        self.field_clocks.get(column).copied().unwrap_or(0)
    }

    /// Record a remote acknowledgement as the new baseline
    pub fn acknowledge(&mut self, record: RemoteRecord) {
        self.zone = record.system.zone.clone();
        self.last_known_system_fields = Some(record.system_fields());
        self.last_known_snapshot = Some(record);
    }

    /// Forget the remote baseline; the next push recreates the record
    pub fn clear_snapshots(&mut self) {
        self.last_known_system_fields = None;
        self.last_known_snapshot = None;
    }

    /// System fields to send with the next save
    pub fn outgoing_system_fields(&self) -> SystemFields {
        SystemFields {
            identity: self.identity.clone(),
            zone: self.zone.clone(),
            change_tag: self.change_tag().cloned(),
            parent: self.parent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_acknowledge_sets_both_snapshots() {
        let id = RecordIdentity::new("lists", "1");
        let mut meta = SyncMetadata::new(id.clone(), ZoneId::default_zone(), Partition::Private);
        assert!(!meta.is_synced());

        let mut record = RemoteRecord::new(id, ZoneId::default_zone()).with_field("title", json!("a"), 3);
        record.system.change_tag = Some(ChangeTag::new("t1"));
        meta.acknowledge(record);

        assert!(meta.is_synced());
        assert_eq!(meta.change_tag().map(ChangeTag::as_str), Some("t1"));

        meta.clear_snapshots();
        assert!(!meta.is_synced());
        assert!(meta.outgoing_system_fields().change_tag.is_none());
    }
}
