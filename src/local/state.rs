//! In-memory image of the local database
//!
//! User tables and the sync store live side by side in one value so a
//! single transaction covers a row write and its bookkeeping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataStore, PendingQueue, StagedRecords};
use crate::record::{LogicalClock, Partition, RecordIdentity, Row, ShareMetadata};
use crate::remote::ChangeToken;
use crate::schema::RecordTypeSignature;

/// Rows of one table keyed by rendered primary key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableData {
    rows: BTreeMap<String, Row>,
}

impl TableData {
    /// Row by primary key
    pub fn get(&self, pk: &str) -> Option<&Row> {
        self.rows.get(pk)
    }

    /// Mutable row by primary key
    pub fn get_mut(&mut self, pk: &str) -> Option<&mut Row> {
        self.rows.get_mut(pk)
    }

    /// Insert or replace a row
    pub fn put(&mut self, pk: impl Into<String>, row: Row) -> Option<Row> {
        self.rows.insert(pk.into(), row)
    }

    /// Remove a row
    pub fn remove(&mut self, pk: &str) -> Option<Row> {
        self.rows.remove(pk)
    }

    /// Rows in primary key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Row)> {
        self.rows.iter()
    }

    /// Rows, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Row)> {
        self.rows.iter_mut()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Change tokens per partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private: Option<ChangeToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shared: Option<ChangeToken>,
}

impl PartitionTokens {
    /// Token of a partition
    pub fn get(&self, partition: Partition) -> Option<&ChangeToken> {
        match partition {
            Partition::Private => self.private.as_ref(),
            Partition::Shared => self.shared.as_ref(),
        }
    }

    /// Replace the token of a partition
    pub fn set(&mut self, partition: Partition, token: Option<ChangeToken>) {
        match partition {
            Partition::Private => self.private = token,
            Partition::Shared => self.shared = token,
        }
    }
}

/// The sync store, kept apart from user tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Per-row metadata
    #[serde(default)]
    pub metadata: MetadataStore,
    /// Pending changes
    #[serde(default)]
    pub pending: PendingQueue,
    /// Records waiting for a parent or a table
    #[serde(default)]
    pub staged: StagedRecords,
    /// Table signatures from the previous run
    #[serde(default)]
    pub signatures: BTreeMap<String, RecordTypeSignature>,
    /// Incremental fetch positions
    #[serde(default)]
    pub tokens: PartitionTokens,
    /// Logical clock
    #[serde(default)]
    pub clock: LogicalClock,
    /// Shares accepted from other users
    #[serde(default)]
    pub accepted_shares: Vec<ShareMetadata>,
}

/// Whole local database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseState {
    /// User tables
    #[serde(default)]
    pub tables: BTreeMap<String, TableData>,
    /// Sync bookkeeping
    #[serde(default)]
    pub sync: SyncState,
}

impl DatabaseState {
    /// Empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Table by name
    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    /// Table by name, created when missing
    pub fn table_mut(&mut self, name: &str) -> &mut TableData {
        self.tables.entry(name.to_string()).or_default()
    }

    /// Row by identity
    pub fn row(&self, identity: &RecordIdentity) -> Option<&Row> {
        self.tables
            .get(identity.table())
            .and_then(|t| t.get(identity.primary_key()))
    }

    /// Whether a row exists
    pub fn has_row(&self, identity: &RecordIdentity) -> bool {
        self.row(identity).is_some()
    }

    /// Insert or replace a row
    pub fn put_row(&mut self, identity: &RecordIdentity, row: Row) -> Option<Row> {
        self.table_mut(identity.table()).put(identity.primary_key(), row)
    }

    /// Remove a row
    pub fn remove_row(&mut self, identity: &RecordIdentity) -> Option<Row> {
        self.tables
            .get_mut(identity.table())
            .and_then(|t| t.remove(identity.primary_key()))
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(TableData::len).unwrap_or(0)
    }
}
