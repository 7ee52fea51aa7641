//! Schema drift detection and back-fill

use serde_json::Value;

use crate::capture::WriteContext;
use crate::conflict::MissingClockPolicy;
use crate::local::{DatabaseState, LocalDatabase, WriteResult, WriteSession};
use crate::metadata::PendingKind;
use crate::observability::{log_event_with_fields, Event};
use crate::pull::{apply_record, ApplyOutcome};
use crate::record::RecordIdentity;
use crate::schema::{SchemaRegistry, TableSchema};

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// No signatures were cached; only recorded
    pub first_launch: bool,
    /// Tables registered since the last run
    pub tables_added: usize,
    /// Tables no longer registered
    pub tables_removed: usize,
    /// Columns added across all tables
    pub columns_added: usize,
    /// Columns removed across all tables
    pub columns_removed: usize,
    /// Rows given a value for an added column
    pub rows_backfilled: usize,
    /// Saves enqueued because a back-filled value is unknown to the remote
    pub saves_enqueued: usize,
    /// Records applied that were staged for an unknown table
    pub unstaged: usize,
}

/// Brings stored rows in line with the registered schema
pub struct SchemaReconciler<'a> {
    db: &'a LocalDatabase,
    registry: &'a SchemaRegistry,
    policy: MissingClockPolicy,
}

impl<'a> SchemaReconciler<'a> {
    /// Reconciler for the registered tables; `policy` applies to staged records
    pub fn new(db: &'a LocalDatabase, registry: &'a SchemaRegistry, policy: MissingClockPolicy) -> Self {
        Self { db, registry, policy }
    }

    /// Compare cached signatures with the live schema and repair drift
    ///
    /// Runs in one transaction; the live signatures are stored on success.
    pub fn reconcile(&self) -> WriteResult<ReconcileReport> {
        let report = self.db.transaction(|state| self.reconcile_state(state))?;

        log_event_with_fields(
            Event::SchemaReconciled,
            &[
                ("columns_added", report.columns_added.to_string().as_str()),
                ("columns_removed", report.columns_removed.to_string().as_str()),
                ("first_launch", if report.first_launch { "true" } else { "false" }),
                ("tables_added", report.tables_added.to_string().as_str()),
                ("tables_removed", report.tables_removed.to_string().as_str()),
            ],
        );
        Ok(report)
    }

    fn reconcile_state(&self, state: &mut DatabaseState) -> WriteResult<ReconcileReport> {
        let live = self.registry.signatures();
        let mut report = ReconcileReport::default();

        if state.sync.signatures.is_empty() {
            report.first_launch = true;
        } else {
            for (name, cached) in state.sync.signatures.clone() {
                let schema = match self.registry.schema(&name) {
                    Some(schema) => schema,
                    None => {
                        report.tables_removed += 1;
                        continue;
                    }
                };
                let diff = match live.get(&name) {
                    Some(signature) => cached.diff(signature),
                    None => continue,
                };
                for column in &diff.added {
                    self.backfill(state, schema, column, &mut report)?;
                }
                for column in &diff.removed {
                    strip_column(state, &name, column);
                }
                report.columns_added += diff.added.len();
                report.columns_removed += diff.removed.len();
            }
            report.tables_added = live
                .keys()
                .filter(|name| !state.sync.signatures.contains_key(*name))
                .count();
        }

        // Staged records for any registered table can be applied now
        for name in self.registry.order().tables() {
            for staged in state.sync.staged.take_unknown_table(name) {
                if apply_record(state, self.registry, staged.record, staged.partition, self.policy)?
                    == ApplyOutcome::Applied
                {
                    report.unstaged += 1;
                }
            }
        }

        state.sync.signatures = live;
        Ok(report)
    }

    fn backfill(
        &self,
        state: &mut DatabaseState,
        schema: &TableSchema,
        column: &str,
        report: &mut ReconcileReport,
    ) -> WriteResult<()> {
        let keys: Vec<String> = match state.table(&schema.name) {
            Some(table) => table.iter().map(|(pk, _)| pk.clone()).collect(),
            None => return Ok(()),
        };

        for pk in keys {
            let identity = RecordIdentity::new(schema.name.clone(), pk);
            let snapshot = state
                .sync
                .metadata
                .get(&identity)
                .and_then(|m| m.last_known_snapshot.clone());

            let carried = snapshot.as_ref().and_then(|s| s.value(column).cloned());
            let value = carried.clone().unwrap_or_else(|| schema.default_of(column));

            WriteSession::new(state, self.registry, WriteContext::remote())
                .set_column(&identity, column, value.clone())?;
            report.rows_backfilled += 1;

            let snapshot = match snapshot {
                Some(snapshot) => snapshot,
                None => continue,
            };
            let implied = carried.unwrap_or(Value::Null);
            let sync = &mut state.sync;
            let clock = if value != implied {
                Some(sync.clock.tick(0))
            } else {
                snapshot.field_clock(column)
            };
            if let Some(meta) = sync.metadata.get_mut(&identity) {
                if let Some(clock) = clock {
                    meta.field_clocks.insert(column.to_string(), clock);
                    meta.modification_clock = meta.modification_clock.max(clock);
                }
            }
            if value != implied {
                sync.pending.enqueue(identity, PendingKind::Save);
                report.saves_enqueued += 1;
            }
        }
        Ok(())
    }
}

fn strip_column(state: &mut DatabaseState, table: &str, column: &str) {
    for (_, row) in state.table_mut(table).iter_mut() {
        row.remove(column);
    }
    for meta in state.sync.metadata.iter_mut() {
        if meta.identity.table() == table {
            meta.field_clocks.remove(column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Partition, RemoteRecord, Row, ZoneId};
    use crate::schema::SyncTable;
    use serde_json::json;

    fn registry(with_color: bool) -> SchemaRegistry {
        let mut notes = TableSchema::new("notes", "id").column("title");
        if with_color {
            notes = notes.column_with_default("color", json!("blue"));
        }
        SchemaRegistry::new(vec![SyncTable::private(notes)]).unwrap()
    }

    fn seed_synced_note(db: &LocalDatabase, reg: &SchemaRegistry, snapshot_color: Option<&str>) {
        let mut record = RemoteRecord::new(RecordIdentity::new("notes", "1"), ZoneId::default_zone())
            .with_field("id", json!(1), 1)
            .with_field("title", json!("hello"), 1);
        if let Some(color) = snapshot_color {
            record = record.with_field("color", json!(color), 4);
        }
        db.transaction(|s| {
            apply_record(s, reg, record, Partition::Private, MissingClockPolicy::default()).map(|_| ())
        })
        .unwrap();
    }

    #[test]
    fn test_first_launch_only_records_signatures() {
        let db = LocalDatabase::in_memory();
        let reg = registry(false);
        let report = SchemaReconciler::new(&db, &reg, MissingClockPolicy::default())
            .reconcile()
            .unwrap();
        assert!(report.first_launch);
        assert_eq!(db.read(|s| s.sync.signatures.len()), 1);
    }

    #[test]
    fn test_added_column_restored_from_snapshot() {
        let db = LocalDatabase::in_memory();
        let old = registry(false);
        SchemaReconciler::new(&db, &old, MissingClockPolicy::default()).reconcile().unwrap();
        seed_synced_note(&db, &old, Some("red"));

        let new = registry(true);
        let report = SchemaReconciler::new(&db, &new, MissingClockPolicy::default())
            .reconcile()
            .unwrap();
        assert_eq!(report.columns_added, 1);
        assert_eq!(report.saves_enqueued, 0);

        let id = RecordIdentity::new("notes", "1");
        let row: Row = db.read(|s| s.row(&id).cloned()).unwrap();
        assert_eq!(row["color"], json!("red"));
        assert_eq!(db.read(|s| s.sync.metadata.get(&id).map(|m| m.field_clock("color"))), Some(4));
        assert!(db.read(|s| s.sync.pending.is_empty()));
    }

    #[test]
    fn test_added_column_default_is_pushed() {
        let db = LocalDatabase::in_memory();
        let old = registry(false);
        SchemaReconciler::new(&db, &old, MissingClockPolicy::default()).reconcile().unwrap();
        seed_synced_note(&db, &old, None);

        let new = registry(true);
        let report = SchemaReconciler::new(&db, &new, MissingClockPolicy::default())
            .reconcile()
            .unwrap();
        assert_eq!(report.saves_enqueued, 1);
        let id = RecordIdentity::new("notes", "1");
        assert_eq!(db.read(|s| s.row(&id).map(|r| r["color"].clone())), Some(json!("blue")));
        assert!(db.read(|s| s.sync.pending.has_save(&id)));
    }

    #[test]
    fn test_removed_column_is_stripped() {
        let db = LocalDatabase::in_memory();
        let old = registry(true);
        SchemaReconciler::new(&db, &old, MissingClockPolicy::default()).reconcile().unwrap();
        seed_synced_note(&db, &old, Some("red"));

        let new = registry(false);
        let report = SchemaReconciler::new(&db, &new, MissingClockPolicy::default())
            .reconcile()
            .unwrap();
        assert_eq!(report.columns_removed, 1);
        let id = RecordIdentity::new("notes", "1");
        assert!(db.read(|s| s.row(&id).map(|r| !r.contains_key("color"))).unwrap());
    }

    #[test]
    fn test_unregistered_table_signature_dropped() {
        let db = LocalDatabase::in_memory();
        let reg = SchemaRegistry::new(vec![
            SyncTable::private(TableSchema::new("notes", "id")),
            SyncTable::private(TableSchema::new("tags", "id")),
        ])
        .unwrap();
        SchemaReconciler::new(&db, &reg, MissingClockPolicy::default()).reconcile().unwrap();

        let report = SchemaReconciler::new(&db, &registry(false), MissingClockPolicy::default())
            .reconcile()
            .unwrap();
        assert_eq!(report.tables_removed, 1);
        assert!(db.read(|s| !s.sync.signatures.contains_key("tags")));
    }
}
