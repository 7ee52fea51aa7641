//! Applying remote records to the local image
//!
//! All functions run inside a caller's transaction and write rows under a
//! remote `WriteContext`, so nothing here is captured as a local change.

use serde_json::Value;

use crate::capture::{forget, WriteContext};
use crate::conflict::{merge, MissingClockPolicy};
use crate::foreign_key::{check_references, derive_parent, ForeignKeyViolation};
use crate::local::{DatabaseState, WriteResult, WriteSession};
use crate::metadata::{StageReason, SyncMetadata};
use crate::record::{primary_key_string, primary_key_value, Partition, RecordIdentity, RemoteRecord, Row};
use crate::schema::{SchemaRegistry, TableSchema};

/// What happened to one remote record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Row written and metadata updated
    Applied,
    /// Record kept aside until it can be applied
    Staged(StageReason),
    /// Record ignored because a local delete is pending
    Skipped,
}

/// Apply a remote deletion
///
/// A pending local save loses against the deletion. Returns whether a
/// local row existed.
pub fn apply_deletion(
    state: &mut DatabaseState,
    registry: &SchemaRegistry,
    identity: &RecordIdentity,
) -> WriteResult<bool> {
    let existed = state.has_row(identity) && registry.contains(identity.table());
    if existed {
        WriteSession::new(state, registry, WriteContext::remote()).delete(identity)?;
    }
    forget(&mut state.sync, identity);
    Ok(existed)
}

fn incoming_row(schema: &TableSchema, identity: &RecordIdentity, record: &RemoteRecord, base: Option<&Row>) -> Row {
    let mut row = base.cloned().unwrap_or_else(|| schema.default_row());
    for column in schema.column_names() {
        if let Some(value) = record.value(column) {
            row.insert(column.to_string(), value.clone());
        }
    }
    if row.get(&schema.primary_key).map_or(true, Value::is_null) {
        row.insert(
            schema.primary_key.clone(),
            primary_key_value(identity.primary_key()),
        );
    }
    row
}

fn missing_parent(violation: &ForeignKeyViolation) -> Option<RecordIdentity> {
    match violation {
        ForeignKeyViolation::MissingParent {
            parent_table,
            value,
            ..
        } => primary_key_string(value).map(|pk| RecordIdentity::new(parent_table.as_str(), pk)),
        ForeignKeyViolation::Restrict { .. } => None,
    }
}

/// Apply a created or modified remote record
///
/// Records of unknown tables, and records whose parent has no local row,
/// are staged. When a local save is pending the row is merged field by
/// field and the save stays pending only if local values won or the local
/// parent or share differ.
pub fn apply_record(
    state: &mut DatabaseState,
    registry: &SchemaRegistry,
    record: RemoteRecord,
    partition: Partition,
    policy: MissingClockPolicy,
) -> WriteResult<ApplyOutcome> {
    let identity = record.identity().clone();
    let schema = match registry.schema(record.table()) {
        Some(schema) => schema,
        None => {
            state
                .sync
                .staged
                .stage(record, partition, StageReason::UnknownTable);
            return Ok(ApplyOutcome::Staged(StageReason::UnknownTable));
        }
    };

    if state.sync.pending.has_delete(&identity) {
        return Ok(ApplyOutcome::Skipped);
    }

    let existing = state.row(&identity).cloned();
    let meta_before = state.sync.metadata.get(&identity).cloned();
    let pending_save = state.sync.pending.has_save(&identity);

    let (row, local_won) = match (&existing, &meta_before) {
        (Some(local), Some(meta)) if pending_save => {
            let outcome = merge(
                schema.column_names(),
                local,
                &meta.field_clocks,
                meta.last_known_snapshot.as_ref(),
                &record,
                policy,
            );
            let mut row = local.clone();
            for (column, (value, _)) in &outcome.take_remote {
                row.insert(column.clone(), value.clone());
            }
            (row, Some(outcome))
        }
        _ => (incoming_row(schema, &identity, &record, existing.as_ref()), None),
    };

    // The declared parent must be present before the row can land
    let declared = record
        .parent()
        .cloned()
        .or_else(|| derive_parent(state, registry, schema, &row));
    if let Some(parent) = &declared {
        if !state.has_row(parent) {
            let reason = StageReason::MissingParent(parent.clone());
            state.sync.staged.stage(record, partition, reason.clone());
            return Ok(ApplyOutcome::Staged(reason));
        }
    }
    let parent = match check_references(state, registry, schema, &identity, &row) {
        Ok(parent) => parent,
        Err(violation) => {
            let parent = missing_parent(&violation)
                .or(declared)
                .unwrap_or_else(|| identity.clone());
            let reason = StageReason::MissingParent(parent);
            state.sync.staged.stage(record, partition, reason.clone());
            return Ok(ApplyOutcome::Staged(reason));
        }
    };

    {
        let mut session = WriteSession::new(state, registry, WriteContext::remote());
        if existing.is_some() {
            session.update(&identity, row)?;
        } else {
            session.insert(record.table(), row)?;
        }
    }

    let keep_pending = match (&local_won, &meta_before) {
        (Some(outcome), Some(meta)) => {
            outcome.local_won() || meta.parent != parent || meta.share != record.share
        }
        _ => false,
    };

    let clock = record.max_field_clock();
    let meta = state.sync.metadata.get_or_insert_with(&identity, || {
        SyncMetadata::new(identity.clone(), record.system.zone.clone(), partition)
    });
    meta.partition = partition;
    meta.parent = parent;
    meta.is_deleted_locally = false;
    if !keep_pending {
        meta.share = record.share.clone();
    }
    for (column, field) in &record.fields {
        let local_kept = local_won
            .as_ref()
            .map_or(false, |o| o.keep_local.contains(column));
        if let (Some(at), false) = (field.modified_at, local_kept) {
            meta.field_clocks.insert(column.clone(), at);
        }
    }
    meta.modification_clock = meta.modification_clock.max(clock);
    meta.acknowledge(record);

    state.sync.clock.observe(clock);
    state.sync.staged.remove(&identity);
    if pending_save && !keep_pending {
        state.sync.pending.remove(&identity);
    }
    Ok(ApplyOutcome::Applied)
}

/// Retry staged records of a partition until no more can be applied
///
/// Records staged for an unknown table wait for the table to be
/// registered. Returns the number applied.
pub fn retry_staged(
    state: &mut DatabaseState,
    registry: &SchemaRegistry,
    partition: Partition,
    policy: MissingClockPolicy,
) -> WriteResult<usize> {
    let mut applied = 0;
    loop {
        let mut candidates: Vec<RemoteRecord> = state
            .sync
            .staged
            .iter()
            .filter(|s| s.partition == partition && s.reason != StageReason::UnknownTable)
            .map(|s| s.record.clone())
            .collect();
        registry
            .order()
            .sort_parents_first(&mut candidates, |r| r.table());

        let mut progress = false;
        for record in candidates {
            let identity = record.identity().clone();
            match apply_record(state, registry, record, partition, policy)? {
                ApplyOutcome::Applied => {
                    applied += 1;
                    progress = true;
                }
                ApplyOutcome::Skipped => {
                    state.sync.staged.remove(&identity);
                    progress = true;
                }
                ApplyOutcome::Staged(_) => {}
            }
        }
        if !progress {
            return Ok(applied);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::record_save;
    use crate::record::{ChangeTag, ZoneId};
    use crate::schema::{ForeignKeyAction, SyncTable};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![
            SyncTable::shareable(TableSchema::new("lists", "id").column("title")),
            SyncTable::shareable(
                TableSchema::new("items", "id")
                    .column("list_id")
                    .column("name")
                    .foreign_key(
                        "list_id",
                        "lists",
                        "id",
                        ForeignKeyAction::Cascade,
                        ForeignKeyAction::Cascade,
                    ),
            ),
        ])
        .unwrap()
    }

    fn list(pk: i64, title: &str, clock: u64) -> RemoteRecord {
        let mut record = RemoteRecord::new(RecordIdentity::new("lists", pk.to_string()), ZoneId::default_zone())
            .with_field("id", json!(pk), clock)
            .with_field("title", json!(title), clock);
        record.system.change_tag = Some(ChangeTag::new(format!("t{}", clock)));
        record
    }

    fn item(pk: &str, list: i64) -> RemoteRecord {
        RemoteRecord::new(RecordIdentity::new("items", pk), ZoneId::default_zone())
            .with_parent(RecordIdentity::new("lists", list.to_string()))
            .with_field("id", json!(pk), 3)
            .with_field("list_id", json!(list), 3)
    }

    const POLICY: MissingClockPolicy = MissingClockPolicy::TreatAsOlder;

    #[test]
    fn test_new_record_creates_row_and_metadata() {
        let reg = registry();
        let mut state = DatabaseState::new();
        let out = apply_record(&mut state, &reg, list(1, "trip", 9), Partition::Private, POLICY).unwrap();
        assert_eq!(out, ApplyOutcome::Applied);

        let id = RecordIdentity::new("lists", "1");
        assert_eq!(state.row(&id).unwrap()["title"], json!("trip"));
        let meta = state.sync.metadata.get(&id).unwrap();
        assert!(meta.is_synced());
        assert_eq!(meta.modification_clock, 9);
        assert_eq!(state.sync.clock.current(), 9);
        assert!(state.sync.pending.is_empty());
    }

    #[test]
    fn test_orphan_is_staged_then_applied() {
        let reg = registry();
        let mut state = DatabaseState::new();
        let out = apply_record(&mut state, &reg, item("a", 1), Partition::Private, POLICY).unwrap();
        assert_eq!(
            out,
            ApplyOutcome::Staged(StageReason::MissingParent(RecordIdentity::new("lists", "1")))
        );
        assert_eq!(state.row_count("items"), 0);

        apply_record(&mut state, &reg, list(1, "trip", 2), Partition::Private, POLICY).unwrap();
        let applied = retry_staged(&mut state, &reg, Partition::Private, POLICY).unwrap();
        assert_eq!(applied, 1);
        assert!(state.sync.staged.is_empty());
        assert_eq!(
            state.sync.metadata.get(&RecordIdentity::new("items", "a")).unwrap().parent,
            Some(RecordIdentity::new("lists", "1"))
        );
    }

    #[test]
    fn test_unknown_table_is_staged() {
        let reg = registry();
        let mut state = DatabaseState::new();
        let record = RemoteRecord::new(RecordIdentity::new("tags", "x"), ZoneId::default_zone());
        let out = apply_record(&mut state, &reg, record, Partition::Private, POLICY).unwrap();
        assert_eq!(out, ApplyOutcome::Staged(StageReason::UnknownTable));
        assert_eq!(retry_staged(&mut state, &reg, Partition::Private, POLICY).unwrap(), 0);
        assert_eq!(state.sync.staged.len(), 1);
    }

    #[test]
    fn test_pending_delete_wins() {
        let reg = registry();
        let mut state = DatabaseState::new();
        apply_record(&mut state, &reg, list(1, "trip", 2), Partition::Private, POLICY).unwrap();
        let id = RecordIdentity::new("lists", "1");
        WriteSession::new(&mut state, &reg, WriteContext::local()).delete(&id).unwrap();

        let out = apply_record(&mut state, &reg, list(1, "renamed", 5), Partition::Private, POLICY).unwrap();
        assert_eq!(out, ApplyOutcome::Skipped);
        assert!(!state.has_row(&id));
    }

    #[test]
    fn test_remote_deletion_beats_pending_save() {
        let reg = registry();
        let mut state = DatabaseState::new();
        apply_record(&mut state, &reg, list(1, "trip", 2), Partition::Private, POLICY).unwrap();
        apply_record(&mut state, &reg, item("a", 1), Partition::Private, POLICY).unwrap();
        let id = RecordIdentity::new("lists", "1");
        WriteSession::new(&mut state, &reg, WriteContext::local())
            .update(&id, [("title".to_string(), json!("local"))].into_iter().collect())
            .unwrap();

        assert!(apply_deletion(&mut state, &reg, &id).unwrap());
        assert!(!state.has_row(&id));
        assert_eq!(state.row_count("items"), 0);
        assert!(state.sync.pending.is_empty());
        assert!(state.sync.metadata.is_empty());
    }

    #[test]
    fn test_pending_save_merges_and_keeps_local_winner() {
        let reg = registry();
        let mut state = DatabaseState::new();
        apply_record(&mut state, &reg, list(1, "trip", 2), Partition::Private, POLICY).unwrap();
        let id = RecordIdentity::new("lists", "1");

        let old = state.row(&id).cloned().unwrap();
        let mut new = old.clone();
        new.insert("title".into(), json!("local"));
        state.put_row(&id, new.clone());
        record_save(&mut state.sync, &id, Some(&old), &new, None);

        // Remote edited the same field with an older clock
        let out = apply_record(&mut state, &reg, list(1, "remote", 1), Partition::Private, POLICY).unwrap();
        assert_eq!(out, ApplyOutcome::Applied);
        assert_eq!(state.row(&id).unwrap()["title"], json!("local"));
        assert!(state.sync.pending.has_save(&id));
    }
}
