//! Building record saves from local rows

use std::collections::BTreeMap;

use serde_json::Value;

use crate::metadata::SyncMetadata;
use crate::record::{FieldValue, RecordIdentity, RemoteRecord, Row};
use crate::remote::{RecordDelete, RecordSave};
use crate::schema::TableSchema;

/// A pending change turned into a remote operation
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedOp {
    /// Save the record
    Save(RecordSave),
    /// Delete the record
    Delete(RecordDelete),
}

/// One entry of a submitted batch
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    /// Record affected
    pub identity: RecordIdentity,
    /// Pending sequence the plan was built from
    pub sequence: u64,
    /// Operation submitted
    pub op: PlannedOp,
}

impl PlannedChange {
    /// Whether this entry deletes its record
    pub fn is_delete(&self) -> bool {
        matches!(self.op, PlannedOp::Delete(_))
    }
}

fn snapshot_value<'a>(snapshot: &'a RemoteRecord, column: &str) -> &'a Value {
    snapshot.value(column).unwrap_or(&Value::Null)
}

/// Columns whose local value differs from the acknowledged snapshot
///
/// Every column differs when there is no snapshot. A field the snapshot
/// lacks counts as null.
pub fn changed_columns<'a>(
    schema: &'a TableSchema,
    row: &Row,
    snapshot: Option<&RemoteRecord>,
) -> Vec<&'a str> {
    schema
        .column_names()
        .filter(|column| {
            let local = row.get(*column).unwrap_or(&Value::Null);
            match snapshot {
                None => true,
                Some(s) => snapshot_value(s, column) != local,
            }
        })
        .collect()
}

/// Whether the row carries anything the remote has not acknowledged
pub fn has_local_changes(meta: &SyncMetadata, schema: &TableSchema, row: &Row) -> bool {
    build_save(meta, schema, row).is_some()
}

/// Save carrying only what changed since the last acknowledgement
///
/// Returns `None` when fields, parent and share all match the snapshot.
pub fn build_save(meta: &SyncMetadata, schema: &TableSchema, row: &Row) -> Option<RecordSave> {
    let snapshot = meta.last_known_snapshot.as_ref();

    let mut fields = BTreeMap::new();
    for column in changed_columns(schema, row, snapshot) {
        let value = row.get(column).cloned().unwrap_or(Value::Null);
        fields.insert(
            column.to_string(),
            FieldValue::stamped(value, meta.field_clock(column)),
        );
    }

    if let Some(snapshot) = snapshot {
        let parent_changed = snapshot.parent() != meta.parent.as_ref();
        let share_changed = snapshot.share != meta.share;
        if fields.is_empty() && !parent_changed && !share_changed {
            return None;
        }
    }

    Some(RecordSave {
        system: meta.outgoing_system_fields(),
        fields,
        share: meta.share.clone(),
    })
}
