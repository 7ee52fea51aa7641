//! In-memory remote store
//!
//! Behaves like one remote database: zones, change tags, an ordered change
//! log for incremental fetch, parent checks and hierarchical deletes. Cloned
//! handles share the same server, so two engines given clones of one store
//! act as two devices of the same user.
//!
//! Test hooks simulate other devices (`put_record`, `edit_field`,
//! `delete_record`) and failures (`fail_next_call`, `fail_record`,
//! `set_read_only`, `stall_submits`).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use super::errors::{RemoteError, RemoteErrorCode, RemoteResult};
use super::store::{RemoteFuture, RemoteStore};
use super::types::{
    AccountStatus, ChangeToken, FetchedChanges, RecordDelete, RecordSave, SubmitBatch,
    SubmitOutcome,
};
use crate::record::{
    ChangeTag, FieldValue, RecordIdentity, RemoteRecord, ShareHandle, ShareMetadata, ZoneId,
};

#[derive(Debug)]
struct ServerState {
    zones: BTreeSet<ZoneId>,
    read_only_zones: BTreeSet<ZoneId>,
    records: BTreeMap<RecordIdentity, RemoteRecord>,
    log: Vec<(u64, RecordIdentity)>,
    seq: u64,
    tags: u64,
    offered_shares: BTreeMap<Uuid, ShareMetadata>,
    fail_next: VecDeque<RemoteErrorCode>,
    record_failures: BTreeMap<RecordIdentity, RemoteErrorCode>,
    stall_submits: bool,
    account: AccountStatus,
    page_size: usize,
    calls: BTreeMap<String, usize>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            zones: BTreeSet::new(),
            read_only_zones: BTreeSet::new(),
            records: BTreeMap::new(),
            log: Vec::new(),
            seq: 0,
            tags: 0,
            offered_shares: BTreeMap::new(),
            fail_next: VecDeque::new(),
            record_failures: BTreeMap::new(),
            stall_submits: false,
            account: AccountStatus::Available,
            page_size: usize::MAX,
            calls: BTreeMap::new(),
        }
    }

    fn log_change(&mut self, identity: RecordIdentity) {
        self.seq += 1;
        self.log.push((self.seq, identity));
    }

    fn commit(&mut self, mut record: RemoteRecord) -> RemoteRecord {
        self.tags += 1;
        record.system.change_tag = Some(ChangeTag::new(format!("t{}", self.tags)));
        let identity = record.identity().clone();
        self.records.insert(identity.clone(), record.clone());
        self.log_change(identity);
        record
    }

    fn remove_tree(&mut self, root: &RecordIdentity) {
        let mut doomed = vec![root.clone()];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i].clone();
            doomed.extend(
                self.records
                    .values()
                    .filter(|r| r.parent() == Some(&current))
                    .map(|r| r.identity().clone()),
            );
            i += 1;
        }
        for identity in doomed.into_iter().rev() {
            if self.records.remove(&identity).is_some() {
                self.log_change(identity);
            }
        }
    }

    fn apply_save(&mut self, save: RecordSave) -> SubmitOutcome {
        let identity = save.identity().clone();
        if let Some(code) = self.record_failures.get(&identity) {
            return SubmitOutcome::Failed(*code);
        }
        if !self.zones.contains(&save.system.zone) {
            return SubmitOutcome::Failed(RemoteErrorCode::ZoneNotFound);
        }
        if self.read_only_zones.contains(&save.system.zone) {
            return SubmitOutcome::Failed(RemoteErrorCode::PermissionFailure);
        }
        match self.records.get(&identity) {
            Some(existing) if existing.system.change_tag != save.system.change_tag => {
                return SubmitOutcome::Conflict(existing.clone());
            }
            None if save.system.change_tag.is_some() => {
                return SubmitOutcome::Failed(RemoteErrorCode::UnknownItem);
            }
            _ => {}
        }
        if let Some(parent) = &save.system.parent {
            if !self.records.contains_key(parent) {
                return SubmitOutcome::Failed(RemoteErrorCode::ReferenceViolation);
            }
        }

        let mut record = self
            .records
            .get(&identity)
            .cloned()
            .unwrap_or_else(|| RemoteRecord::new(identity.clone(), save.system.zone.clone()));
        record.system.zone = save.system.zone;
        record.system.parent = save.system.parent;
        record.fields.extend(save.fields);
        record.share = save.share;
        SubmitOutcome::Committed(self.commit(record))
    }

    fn apply_delete(&mut self, delete: RecordDelete) -> SubmitOutcome {
        if let Some(code) = self.record_failures.get(&delete.identity) {
            return SubmitOutcome::Failed(*code);
        }
        if !self.records.contains_key(&delete.identity) {
            return SubmitOutcome::Failed(RemoteErrorCode::UnknownItem);
        }
        if self.read_only_zones.contains(&delete.zone) {
            return SubmitOutcome::Failed(RemoteErrorCode::PermissionFailure);
        }
        self.remove_tree(&delete.identity);
        SubmitOutcome::Deleted
    }

    fn changes_since(&self, since: u64) -> FetchedChanges {
        let mut latest: BTreeMap<&RecordIdentity, u64> = BTreeMap::new();
        for (seq, identity) in self.log.iter().filter(|(seq, _)| *seq > since) {
            latest.insert(identity, *seq);
        }
        let mut changed: Vec<(&RecordIdentity, u64)> = latest.into_iter().collect();
        changed.sort_by_key(|(_, seq)| *seq);

        let more_coming = changed.len() > self.page_size;
        changed.truncate(self.page_size);
        let token = match (more_coming, changed.last()) {
            (true, Some((_, seq))) => *seq,
            _ => self.seq.max(since),
        };

        let mut modified = Vec::new();
        let mut deleted = Vec::new();
        for (identity, _) in changed {
            match self.records.get(identity) {
                Some(record) => modified.push(record.clone()),
                None => deleted.push(identity.clone()),
            }
        }

        FetchedChanges {
            modified,
            deleted,
            token: ChangeToken::new(token.to_string()),
            more_coming,
        }
    }
}

/// In-memory `RemoteStore`
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<ServerState>>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Empty server with no zones
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServerState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, op: &str) -> RemoteResult<MutexGuard<'_, ServerState>> {
        let mut state = self.lock();
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        match state.fail_next.pop_front() {
            Some(code) => Err(RemoteError::new(code, format!("injected failure in {}", op))),
            None => Ok(state),
        }
    }

    // ---- other-device simulation ----

    /// Create a zone directly
    pub fn ensure_zone(&self, zone: ZoneId) {
        self.lock().zones.insert(zone);
    }

    /// Whether a zone exists
    pub fn has_zone(&self, zone: &ZoneId) -> bool {
        self.lock().zones.contains(zone)
    }

    /// Store a record as another device would, creating its zone
    pub fn put_record(&self, record: RemoteRecord) -> RemoteRecord {
        let mut state = self.lock();
        state.zones.insert(record.system.zone.clone());
        state.commit(record)
    }

    /// Change one field of a stored record as another device would
    pub fn edit_field(
        &self,
        identity: &RecordIdentity,
        column: &str,
        value: Value,
        modified_at: Option<u64>,
    ) -> Option<RemoteRecord> {
        let mut state = self.lock();
        let mut record = state.records.get(identity)?.clone();
        record.set_field(
            column,
            FieldValue {
                value,
                modified_at,
            },
        );
        Some(state.commit(record))
    }

    /// Delete a record and its descendants as another device would
    pub fn delete_record(&self, identity: &RecordIdentity) -> bool {
        let mut state = self.lock();
        let existed = state.records.contains_key(identity);
        state.remove_tree(identity);
        existed
    }

    /// Current server copy of a record
    pub fn record(&self, identity: &RecordIdentity) -> Option<RemoteRecord> {
        self.lock().records.get(identity).cloned()
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Make another user's share acceptable through `accept_share`
    pub fn offer_share(&self, metadata: ShareMetadata) {
        self.lock().offered_shares.insert(metadata.share_id, metadata);
    }

    // ---- failure injection ----

    /// Fail the next call with `code`
    pub fn fail_next_call(&self, code: RemoteErrorCode) {
        self.lock().fail_next.push_back(code);
    }

    /// Fail every save and delete of `identity` with `code`
    pub fn fail_record(&self, identity: RecordIdentity, code: RemoteErrorCode) {
        self.lock().record_failures.insert(identity, code);
    }

    /// Stop failing `identity`
    pub fn clear_record_failure(&self, identity: &RecordIdentity) {
        self.lock().record_failures.remove(identity);
    }

    /// Reject writes into `zone`
    pub fn set_read_only(&self, zone: ZoneId) {
        self.lock().read_only_zones.insert(zone);
    }

    /// Make `submit_batch` never complete
    pub fn stall_submits(&self, stalled: bool) {
        self.lock().stall_submits = stalled;
    }

    /// Change the reported account status
    pub fn set_account_status(&self, status: AccountStatus) {
        self.lock().account = status;
    }

    /// Limit records per fetched page
    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Number of calls made to an operation
    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn account_status(&self) -> RemoteFuture<'_, AccountStatus> {
        Box::pin(async move {
            let state = self.begin("account_status")?;
            Ok(state.account)
        })
    }

    fn create_zone(&self, zone: ZoneId) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.begin("create_zone")?;
            state.zones.insert(zone);
            Ok(())
        })
    }

    fn delete_zone(&self, zone: ZoneId) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.begin("delete_zone")?;
            state.zones.remove(&zone);
            state.records.retain(|_, r| r.system.zone != zone);
            Ok(())
        })
    }

    fn fetch_changes(&self, since: Option<ChangeToken>) -> RemoteFuture<'_, FetchedChanges> {
        Box::pin(async move {
            let state = self.begin("fetch_changes")?;
            let since = match since {
                None => 0,
                Some(token) => token.as_str().parse::<u64>().map_err(|_| {
                    RemoteError::new(
                        RemoteErrorCode::InvalidArguments,
                        format!("bad change token '{}'", token),
                    )
                })?,
            };
            Ok(state.changes_since(since))
        })
    }

    fn fetch_records(
        &self,
        identities: Vec<RecordIdentity>,
    ) -> RemoteFuture<'_, Vec<(RecordIdentity, Option<RemoteRecord>)>> {
        Box::pin(async move {
            let state = self.begin("fetch_records")?;
            Ok(identities
                .into_iter()
                .map(|id| {
                    let record = state.records.get(&id).cloned();
                    (id, record)
                })
                .collect())
        })
    }

    fn submit_batch(
        &self,
        batch: SubmitBatch,
    ) -> RemoteFuture<'_, Vec<(RecordIdentity, SubmitOutcome)>> {
        Box::pin(async move {
            let stalled = {
                let state = self.begin("submit_batch")?;
                state.stall_submits
            };
            if stalled {
                futures_util::future::pending::<()>().await;
            }

            let mut state = self.lock();
            let mut outcomes = Vec::with_capacity(batch.len());
            for delete in batch.deletes {
                let identity = delete.identity.clone();
                outcomes.push((identity, state.apply_delete(delete)));
            }
            for save in batch.saves {
                let identity = save.identity().clone();
                outcomes.push((identity, state.apply_save(save)));
            }
            Ok(outcomes)
        })
    }

    fn create_share(&self, root: RecordIdentity, zone: ZoneId) -> RemoteFuture<'_, ShareHandle> {
        Box::pin(async move {
            let state = self.begin("create_share")?;
            if !state.records.contains_key(&root) {
                return Err(RemoteError::new(
                    RemoteErrorCode::UnknownItem,
                    format!("no record {}", root),
                ));
            }
            Ok(ShareHandle::owned(root, zone))
        })
    }

    fn accept_share(&self, metadata: ShareMetadata) -> RemoteFuture<'_, ZoneId> {
        Box::pin(async move {
            let mut state = self.begin("accept_share")?;
            if !state.offered_shares.contains_key(&metadata.share_id) {
                return Err(RemoteError::new(
                    RemoteErrorCode::UnknownItem,
                    format!("no share {}", metadata.share_id),
                ));
            }
            state.zones.insert(metadata.zone.clone());
            Ok(metadata.zone)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SystemFields;
    use serde_json::json;

    fn save(identity: RecordIdentity, tag: Option<ChangeTag>) -> RecordSave {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), FieldValue::stamped(json!("milk"), 1));
        RecordSave {
            system: SystemFields {
                identity,
                zone: ZoneId::default_zone(),
                change_tag: tag,
                parent: None,
            },
            fields,
            share: None,
        }
    }

    fn batch(saves: Vec<RecordSave>) -> SubmitBatch {
        SubmitBatch {
            saves,
            deletes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_save_requires_zone() {
        let store = MemoryRemoteStore::new();
        let id = RecordIdentity::new("lists", "1");
        let out = store.submit_batch(batch(vec![save(id.clone(), None)])).await.unwrap();
        assert_eq!(out[0].1, SubmitOutcome::Failed(RemoteErrorCode::ZoneNotFound));

        store.create_zone(ZoneId::default_zone()).await.unwrap();
        let out = store.submit_batch(batch(vec![save(id, None)])).await.unwrap();
        assert!(matches!(out[0].1, SubmitOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn test_stale_tag_conflicts() {
        let store = MemoryRemoteStore::new();
        store.ensure_zone(ZoneId::default_zone());
        let id = RecordIdentity::new("lists", "1");
        store.submit_batch(batch(vec![save(id.clone(), None)])).await.unwrap();

        let out = store
            .submit_batch(batch(vec![save(id.clone(), Some(ChangeTag::new("stale")))]))
            .await
            .unwrap();
        assert!(matches!(out[0].1, SubmitOutcome::Conflict(_)));
    }

    #[tokio::test]
    async fn test_fetch_changes_pages() {
        let store = MemoryRemoteStore::new();
        for pk in ["1", "2", "3"] {
            store.put_record(RemoteRecord::new(
                RecordIdentity::new("lists", pk),
                ZoneId::default_zone(),
            ));
        }
        store.set_page_size(2);

        let first = store.fetch_changes(None).await.unwrap();
        assert_eq!(first.modified.len(), 2);
        assert!(first.more_coming);

        let second = store.fetch_changes(Some(first.token)).await.unwrap();
        assert_eq!(second.modified.len(), 1);
        assert!(!second.more_coming);

        store.delete_record(&RecordIdentity::new("lists", "2"));
        let third = store.fetch_changes(Some(second.token)).await.unwrap();
        assert_eq!(third.deleted, vec![RecordIdentity::new("lists", "2")]);
    }

    #[tokio::test]
    async fn test_delete_removes_descendants() {
        let store = MemoryRemoteStore::new();
        let list = RecordIdentity::new("lists", "1");
        store.put_record(RemoteRecord::new(list.clone(), ZoneId::default_zone()));
        store.put_record(
            RemoteRecord::new(RecordIdentity::new("items", "a"), ZoneId::default_zone())
                .with_parent(list.clone()),
        );
        assert!(store.delete_record(&list));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let store = MemoryRemoteStore::new();
        store.fail_next_call(RemoteErrorCode::NetworkUnavailable);
        assert!(store.account_status().await.is_err());
        assert_eq!(store.account_status().await.unwrap(), AccountStatus::Available);
        assert_eq!(store.call_count("account_status"), 2);
    }
}
