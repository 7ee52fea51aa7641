//! Draining the pending queue of one partition
//!
//! A round is plan, submit, apply. Planning and applying are each one
//! transaction; no lock is held while the batch is in flight, so local
//! writes made meanwhile are picked up by the next round. Dropping the
//! future between those steps leaves the queue as it was.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::batch::{build_save, PlannedChange, PlannedOp};
use crate::capture::{forget, record_save, WriteContext};
use crate::conflict::{merge, MissingClockPolicy};
use crate::engine::SyncResult;
use crate::foreign_key::derive_parent;
use crate::local::{DatabaseState, LocalDatabase, WriteError, WriteResult, WriteSession};
use crate::metadata::PendingKind;
use crate::observability::{log_event_with_fields, warn_event, Event, Logger, ObservationScope};
use crate::pull::{apply_deletion, apply_record};
use crate::record::{Partition, RecordIdentity, RemoteRecord, Row, ZoneId};
use crate::remote::{
    ErrorClass, RecordDelete, RemoteErrorCode, RemoteStore, SubmitBatch, SubmitOutcome,
};
use crate::schema::{ForeignKeyAction, SchemaRegistry};

/// Counts from one push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Batches submitted
    pub rounds: usize,
    /// Saves committed
    pub saved: usize,
    /// Deletes confirmed
    pub deleted: usize,
    /// Conflicts merged
    pub conflicts: usize,
    /// Saves with nothing to send, cleared without a remote call
    pub no_ops: usize,
    /// Deletes of never-synced records, cleared without a remote call
    pub discarded: usize,
    /// Pending changes dropped (stale or rejected)
    pub dropped: usize,
    /// Changes deferred to the next cycle
    pub deferred: usize,
    /// Zones created on demand
    pub zones_created: usize,
    /// Changes refused by the remote for lack of permission
    pub permission_denied: usize,
    /// Per-record transient failures, kept pending
    pub transient: usize,
    /// Per-record fatal failures, kept pending
    pub failed: usize,
}

impl PushReport {
    fn absorb(&mut self, other: &PushReport) {
        self.saved += other.saved;
        self.deleted += other.deleted;
        self.conflicts += other.conflicts;
        self.no_ops += other.no_ops;
        self.discarded += other.discarded;
        self.dropped += other.dropped;
        self.deferred += other.deferred;
        self.permission_denied += other.permission_denied;
        self.transient += other.transient;
        self.failed += other.failed;
    }
}

#[derive(Debug, Default)]
struct Plan {
    changes: Vec<PlannedChange>,
    report: PushReport,
}

impl Plan {
    fn batch(&self) -> SubmitBatch {
        let mut batch = SubmitBatch::default();
        for change in &self.changes {
            match &change.op {
                PlannedOp::Save(save) => batch.saves.push(save.clone()),
                PlannedOp::Delete(delete) => batch.deletes.push(delete.clone()),
            }
        }
        batch
    }
}

#[derive(Debug, Default)]
struct Followups {
    zones: BTreeSet<ZoneId>,
    refetch: Vec<RecordIdentity>,
    deferred: Vec<RecordIdentity>,
    again: bool,
    report: PushReport,
}

/// Pushes the pending changes of one partition
pub struct PushPipeline<'a> {
    db: &'a LocalDatabase,
    registry: &'a SchemaRegistry,
    remote: &'a dyn RemoteStore,
    partition: Partition,
    policy: MissingClockPolicy,
    max_conflict_rounds: usize,
}

impl<'a> PushPipeline<'a> {
    /// Pipeline for one partition
    pub fn new(
        db: &'a LocalDatabase,
        registry: &'a SchemaRegistry,
        remote: &'a dyn RemoteStore,
        partition: Partition,
        policy: MissingClockPolicy,
        max_conflict_rounds: usize,
    ) -> Self {
        Self {
            db,
            registry,
            remote,
            partition,
            policy,
            max_conflict_rounds,
        }
    }

    /// Push until the queue is drained or nothing more can be done now
    pub async fn run(&self) -> SyncResult<PushReport> {
        let scope = ObservationScope::with_fields("PUSH", &[("partition", self.partition.as_str())]);
        let result = self.drain().await;
        match &result {
            Ok(report) => scope.complete_with_fields(&[
                ("conflicts", report.conflicts.to_string().as_str()),
                ("deleted", report.deleted.to_string().as_str()),
                ("rounds", report.rounds.to_string().as_str()),
                ("saved", report.saved.to_string().as_str()),
            ]),
            Err(e) => scope.fail(&e.to_string()),
        }
        result
    }

    async fn drain(&self) -> SyncResult<PushReport> {
        let mut report = PushReport::default();
        let mut deferred: BTreeSet<RecordIdentity> = BTreeSet::new();

        // One initial round plus one per conflict resolution
        for _ in 0..=self.max_conflict_rounds {
            let plan = self.db.transaction(|state| self.plan(state, &deferred))?;
            report.absorb(&plan.report);
            if plan.changes.is_empty() {
                break;
            }

            report.rounds += 1;
            let outcomes = self.remote.submit_batch(plan.batch()).await?;
            let follow = self
                .db
                .transaction(|state| self.apply(state, &plan.changes, outcomes))?;
            report.absorb(&follow.report);

            for zone in &follow.zones {
                self.remote.create_zone(zone.clone()).await?;
                report.zones_created += 1;
                log_event_with_fields(
                    Event::ZoneCreated,
                    &[("owner", zone.owner.as_str()), ("zone", zone.name.as_str())],
                );
            }
            if !follow.refetch.is_empty() {
                self.refetch(follow.refetch).await?;
            }
            deferred.extend(follow.deferred);

            if !follow.again {
                break;
            }
        }
        Ok(report)
    }

    fn plan(&self, state: &mut DatabaseState, deferred: &BTreeSet<RecordIdentity>) -> WriteResult<Plan> {
        let mut plan = Plan::default();

        for change in state.sync.pending.ordered(self.registry.order()) {
            let id = change.identity;
            if deferred.contains(&id) {
                continue;
            }
            match state.sync.metadata.get(&id) {
                Some(meta) if meta.partition != self.partition => continue,
                _ => {}
            }
            let schema = match self.registry.schema(id.table()) {
                Some(schema) => schema,
                None => {
                    state.sync.pending.remove(&id);
                    plan.report.dropped += 1;
                    continue;
                }
            };

            match change.kind {
                PendingKind::Save => {
                    let built = match (state.row(&id), state.sync.metadata.get(&id)) {
                        (Some(row), Some(meta)) => Some(build_save(meta, schema, row)),
                        _ => None,
                    };
                    match built {
                        None => {
                            state.sync.pending.remove(&id);
                            plan.report.dropped += 1;
                        }
                        Some(None) => {
                            state.sync.pending.remove(&id);
                            plan.report.no_ops += 1;
                        }
                        Some(Some(save)) => plan.changes.push(PlannedChange {
                            identity: id,
                            sequence: change.sequence,
                            op: PlannedOp::Save(save),
                        }),
                    }
                }
                PendingKind::Delete => {
                    let zone = match state.sync.metadata.get(&id) {
                        Some(meta) if meta.is_synced() => Some(meta.zone.clone()),
                        _ => None,
                    };
                    match zone {
                        Some(zone) => plan.changes.push(PlannedChange {
                            identity: id.clone(),
                            sequence: change.sequence,
                            op: PlannedOp::Delete(RecordDelete { identity: id, zone }),
                        }),
                        None => {
                            forget(&mut state.sync, &id);
                            plan.report.discarded += 1;
                        }
                    }
                }
            }
        }
        Ok(plan)
    }

    fn apply(
        &self,
        state: &mut DatabaseState,
        changes: &[PlannedChange],
        outcomes: Vec<(RecordIdentity, SubmitOutcome)>,
    ) -> WriteResult<Followups> {
        let mut outcomes: BTreeMap<RecordIdentity, SubmitOutcome> = outcomes.into_iter().collect();
        let mut follow = Followups::default();

        for planned in changes {
            // No outcome: the remote did not get to it, it stays pending
            let outcome = match outcomes.remove(&planned.identity) {
                Some(outcome) => outcome,
                None => continue,
            };
            match outcome {
                SubmitOutcome::Committed(record) => self.on_committed(state, planned, record, &mut follow),
                SubmitOutcome::Deleted => self.on_deleted(state, planned, &mut follow),
                SubmitOutcome::Conflict(server) => self.on_conflict(state, planned, server, &mut follow)?,
                SubmitOutcome::Failed(code) => self.on_failure(state, planned, code, &mut follow)?,
            }
        }
        Ok(follow)
    }

    fn on_committed(
        &self,
        state: &mut DatabaseState,
        planned: &PlannedChange,
        record: RemoteRecord,
        follow: &mut Followups,
    ) {
        let clock = record.max_field_clock();
        if let Some(meta) = state.sync.metadata.get_mut(&planned.identity) {
            meta.acknowledge(record);
        }
        state.sync.clock.observe(clock);
        state
            .sync
            .pending
            .remove_if_unchanged(&planned.identity, planned.sequence);
        follow.report.saved += 1;
    }

    fn on_deleted(&self, state: &mut DatabaseState, planned: &PlannedChange, follow: &mut Followups) {
        let id = &planned.identity;
        if state.sync.pending.remove_if_unchanged(id, planned.sequence) {
            state.sync.metadata.remove(id);
        } else if let Some(meta) = state.sync.metadata.get_mut(id) {
            // Recreated locally while the delete was in flight
            meta.clear_snapshots();
        }
        follow.report.deleted += 1;
    }

    fn on_conflict(
        &self,
        state: &mut DatabaseState,
        planned: &PlannedChange,
        server: RemoteRecord,
        follow: &mut Followups,
    ) -> WriteResult<()> {
        let id = &planned.identity;
        follow.report.conflicts += 1;
        follow.again = true;
        state.sync.clock.observe(server.max_field_clock());

        if planned.is_delete() {
            // The local delete wins; resubmit against the current version
            if let Some(meta) = state.sync.metadata.get_mut(id) {
                meta.acknowledge(server);
            }
            return Ok(());
        }

        let schema = match self.registry.schema(id.table()) {
            Some(schema) => schema,
            None => return Ok(()),
        };
        let (row, meta) = match (state.row(id), state.sync.metadata.get(id)) {
            (Some(row), Some(meta)) => (row.clone(), meta.clone()),
            _ => return Ok(()),
        };

        let outcome = merge(
            schema.column_names(),
            &row,
            &meta.field_clocks,
            meta.last_known_snapshot.as_ref(),
            &server,
            self.policy,
        );

        if let Some(entry) = state.sync.metadata.get_mut(id) {
            entry.acknowledge(server);
            for (column, (_, clock)) in &outcome.take_remote {
                if let Some(clock) = clock {
                    entry.field_clocks.insert(column.clone(), *clock);
                }
            }
        }

        let remote_fields = outcome.take_remote.len().to_string();
        let local_fields = outcome.keep_local.len().to_string();
        if !outcome.take_remote.is_empty() {
            let changes: Row = outcome
                .take_remote
                .into_iter()
                .map(|(column, (value, _))| (column, value))
                .collect();
            match WriteSession::new(state, self.registry, WriteContext::remote()).update(id, changes) {
                Ok(_) => {}
                // The winning parent has not been pulled yet; the next pull brings it
                Err(WriteError::ForeignKey(violation)) => Logger::warn(
                    "CONFLICT_PARENT_MISSING",
                    &[
                        ("record", id.record_name().as_str()),
                        ("reason", violation.to_string().as_str()),
                    ],
                ),
                Err(e) => return Err(e),
            }
        }

        Logger::trace(
            Event::ConflictMerged.as_str(),
            &[
                ("local_fields", local_fields.as_str()),
                ("record", id.record_name().as_str()),
                ("remote_fields", remote_fields.as_str()),
            ],
        );
        Ok(())
    }

    fn on_failure(
        &self,
        state: &mut DatabaseState,
        planned: &PlannedChange,
        code: RemoteErrorCode,
        follow: &mut Followups,
    ) -> WriteResult<()> {
        let id = &planned.identity;
        let record = id.record_name();
        match code.classify() {
            ErrorClass::Transient => follow.report.transient += 1,
            ErrorClass::ZoneMissing => {
                let zone = match &planned.op {
                    PlannedOp::Save(save) => save.system.zone.clone(),
                    PlannedOp::Delete(delete) => delete.zone.clone(),
                };
                if self.partition == Partition::Private {
                    follow.zones.insert(zone);
                    follow.again = true;
                } else {
                    follow.report.failed += 1;
                }
            }
            ErrorClass::Referential => self.on_reference_violation(state, planned, follow)?,
            ErrorClass::Permission => {
                state.sync.pending.remove(id);
                follow.refetch.push(id.clone());
                follow.report.permission_denied += 1;
                warn_event(Event::PermissionDenied, &[("record", record.as_str())]);
            }
            ErrorClass::Quota => {
                follow.deferred.push(id.clone());
                follow.report.deferred += 1;
                warn_event(Event::PendingDeferred, &[("record", record.as_str())]);
            }
            ErrorClass::Invalid => {
                state.sync.pending.remove(id);
                follow.report.dropped += 1;
                Logger::error(
                    Event::PendingDropped.as_str(),
                    &[("code", code.code()), ("record", record.as_str())],
                );
            }
            ErrorClass::UnknownItem => {
                if planned.is_delete() {
                    if state.sync.pending.remove_if_unchanged(id, planned.sequence) {
                        state.sync.metadata.remove(id);
                    }
                    follow.report.deleted += 1;
                } else {
                    if let Some(meta) = state.sync.metadata.get_mut(id) {
                        meta.clear_snapshots();
                    }
                    follow.again = true;
                }
            }
            ErrorClass::Fatal => {
                follow.report.failed += 1;
                Logger::error(
                    "PUSH_RECORD_FAILED",
                    &[("code", code.code()), ("record", record.as_str())],
                );
            }
        }
        Ok(())
    }

    fn on_reference_violation(
        &self,
        state: &mut DatabaseState,
        planned: &PlannedChange,
        follow: &mut Followups,
    ) -> WriteResult<()> {
        let id = &planned.identity;
        let parent = match state.sync.metadata.get(id).and_then(|m| m.parent.clone()) {
            Some(parent) => parent,
            None => {
                follow.report.failed += 1;
                return Ok(());
            }
        };

        if state.has_row(&parent) {
            let parent_synced = state
                .sync
                .metadata
                .get(&parent)
                .map_or(false, |m| m.is_synced());
            if !parent_synced && !state.sync.pending.has_save(&parent) {
                self.enqueue_parent(state, &parent);
            }
            follow.again = true;
            warn_event(
                Event::ReferenceDeferred,
                &[
                    ("parent", parent.record_name().as_str()),
                    ("record", id.record_name().as_str()),
                ],
            );
            return Ok(());
        }

        // Parent is gone here as well: settle the child locally
        let fk = self.registry.parent_link(id.table());
        match fk.map(|fk| (fk, fk.on_delete)) {
            Some((fk, ForeignKeyAction::SetNull)) | Some((fk, ForeignKeyAction::SetDefault)) => {
                let value = if fk.on_delete == ForeignKeyAction::SetNull {
                    Value::Null
                } else {
                    self.registry
                        .schema(id.table())
                        .map(|s| s.default_of(&fk.child_column))
                        .unwrap_or(Value::Null)
                };
                WriteSession::new(state, self.registry, WriteContext::local())
                    .set_column(id, &fk.child_column, value)?;
                follow.again = true;
            }
            _ => {
                if state.has_row(id) {
                    WriteSession::new(state, self.registry, WriteContext::remote()).delete(id)?;
                }
                forget(&mut state.sync, id);
                follow.report.dropped += 1;
            }
        }
        Ok(())
    }

    fn enqueue_parent(&self, state: &mut DatabaseState, parent: &RecordIdentity) {
        if state.sync.metadata.contains(parent) {
            state.sync.pending.enqueue(parent.clone(), PendingKind::Save);
            return;
        }
        let (row, grandparent) = match (state.row(parent), self.registry.schema(parent.table())) {
            (Some(row), Some(schema)) => (
                row.clone(),
                derive_parent(state, self.registry, schema, row),
            ),
            _ => return,
        };
        record_save(&mut state.sync, parent, None, &row, grandparent);
    }

    async fn refetch(&self, identities: Vec<RecordIdentity>) -> SyncResult<()> {
        let fetched = self.remote.fetch_records(identities).await?;
        self.db.transaction(|state| {
            for (identity, record) in fetched {
                match record {
                    Some(record) => {
                        apply_record(state, self.registry, record, self.partition, self.policy)?;
                    }
                    None => {
                        apply_deletion(state, self.registry, &identity)?;
                    }
                }
            }
            Ok::<_, WriteError>(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::SyncedDatabase;
    use crate::remote::MemoryRemoteStore;
    use crate::schema::{SyncTable, TableSchema};
    use serde_json::json;
    use std::sync::Arc;

    fn database() -> SyncedDatabase {
        let registry = SchemaRegistry::new(vec![
            SyncTable::shareable(TableSchema::new("lists", "id").column("title")),
            SyncTable::shareable(TableSchema::new("items", "id").column("list_id").foreign_key(
                "list_id",
                "lists",
                "id",
                ForeignKeyAction::Cascade,
                ForeignKeyAction::Cascade,
            )),
        ])
        .unwrap();
        SyncedDatabase::new(Arc::new(LocalDatabase::in_memory()), Arc::new(registry))
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn pipeline<'a>(db: &'a SyncedDatabase, remote: &'a MemoryRemoteStore) -> PushPipeline<'a> {
        PushPipeline::new(
            db.local(),
            db.registry(),
            remote,
            Partition::Private,
            MissingClockPolicy::default(),
            3,
        )
    }

    #[tokio::test]
    async fn test_zone_is_created_on_demand() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        db.insert("lists", row(&[("id", json!(1)), ("title", json!("trip"))])).unwrap();

        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.zones_created, 1);
        assert_eq!(report.saved, 1);
        assert!(remote.has_zone(&ZoneId::default_zone()));
        assert!(db.pending_changes().is_empty());
    }

    #[tokio::test]
    async fn test_second_push_is_idempotent() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        remote.ensure_zone(ZoneId::default_zone());
        db.insert("lists", row(&[("id", json!(1)), ("title", json!("trip"))])).unwrap();
        pipeline(&db, &remote).run().await.unwrap();

        let before = remote.call_count("submit_batch");
        let id = RecordIdentity::new("lists", "1");
        db.update(&id, row(&[("title", json!("trip"))])).unwrap();
        db.local()
            .transaction::<_, WriteError, _>(|s| {
                s.sync.pending.enqueue(id.clone(), PendingKind::Save);
                Ok(())
            })
            .unwrap();

        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.no_ops, 1);
        assert_eq!(remote.call_count("submit_batch"), before);
    }

    #[tokio::test]
    async fn test_never_synced_delete_makes_no_remote_call() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        db.insert("lists", row(&[("id", json!(1))])).unwrap();
        db.delete(&RecordIdentity::new("lists", "1")).unwrap();

        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(remote.total_calls(), 0);
        assert!(db.metadata(&RecordIdentity::new("lists", "1")).is_none());
    }

    #[tokio::test]
    async fn test_whole_call_failure_keeps_queue() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        remote.ensure_zone(ZoneId::default_zone());
        db.insert("lists", row(&[("id", json!(1))])).unwrap();
        remote.fail_next_call(RemoteErrorCode::NetworkUnavailable);

        let err = pipeline(&db, &remote).run().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(db.pending_changes().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_record_is_dropped() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        remote.ensure_zone(ZoneId::default_zone());
        let id = db.insert("lists", row(&[("id", json!(1))])).unwrap();
        remote.fail_record(id.clone(), RemoteErrorCode::InvalidArguments);

        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(db.pending_changes().is_empty());
        assert!(db.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_quota_defers_to_next_cycle() {
        let db = database();
        let remote = MemoryRemoteStore::new();
        remote.ensure_zone(ZoneId::default_zone());
        let id = db.insert("lists", row(&[("id", json!(1))])).unwrap();
        remote.fail_record(id.clone(), RemoteErrorCode::QuotaExceeded);

        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.rounds, 1);
        assert_eq!(db.pending_changes().len(), 1);

        remote.clear_record_failure(&id);
        let report = pipeline(&db, &remote).run().await.unwrap();
        assert_eq!(report.saved, 1);
    }
}
