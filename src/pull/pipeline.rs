//! Incremental fetch and apply for one partition

use super::apply::{apply_deletion, apply_record, retry_staged, ApplyOutcome};
use crate::conflict::MissingClockPolicy;
use crate::engine::SyncResult;
use crate::local::{DatabaseState, LocalDatabase, WriteResult};
use crate::observability::{Logger, ObservationScope};
use crate::record::Partition;
use crate::remote::{FetchedChanges, RemoteStore};
use crate::schema::SchemaRegistry;

/// Counts from one pull
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Pages fetched
    pub pages: usize,
    /// Remote records written locally
    pub applied: usize,
    /// Local rows deleted by remote deletions
    pub deleted: usize,
    /// Records staged during this pull
    pub staged: usize,
    /// Records ignored because a local delete is pending
    pub skipped: usize,
    /// Previously staged records applied
    pub unstaged: usize,
}

impl PullReport {
    fn absorb(&mut self, other: PullReport) {
        self.pages += other.pages;
        self.applied += other.applied;
        self.deleted += other.deleted;
        self.staged += other.staged;
        self.skipped += other.skipped;
        self.unstaged += other.unstaged;
    }
}

/// Fetches remote changes since the stored token and applies them
///
/// Each page is applied in one transaction together with its token, so a
/// page is either fully applied or refetched.
pub struct PullPipeline<'a> {
    db: &'a LocalDatabase,
    registry: &'a SchemaRegistry,
    remote: &'a dyn RemoteStore,
    partition: Partition,
    policy: MissingClockPolicy,
}

impl<'a> PullPipeline<'a> {
    /// Pipeline for one partition
    pub fn new(
        db: &'a LocalDatabase,
        registry: &'a SchemaRegistry,
        remote: &'a dyn RemoteStore,
        partition: Partition,
        policy: MissingClockPolicy,
    ) -> Self {
        Self {
            db,
            registry,
            remote,
            partition,
            policy,
        }
    }

    /// Fetch and apply until the remote reports no more changes
    pub async fn run(&self) -> SyncResult<PullReport> {
        let scope = ObservationScope::with_fields("PULL", &[("partition", self.partition.as_str())]);
        let result = self.fetch_all().await;
        match &result {
            Ok(report) => scope.complete_with_fields(&[
                ("applied", report.applied.to_string().as_str()),
                ("deleted", report.deleted.to_string().as_str()),
                ("staged", report.staged.to_string().as_str()),
            ]),
            Err(e) => scope.fail(&e.to_string()),
        }
        result
    }

    async fn fetch_all(&self) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        loop {
            let token = self
                .db
                .read(|s| s.sync.tokens.get(self.partition).cloned());
            let changes = self.remote.fetch_changes(token).await?;
            let more_coming = changes.more_coming;
            let page = self
                .db
                .transaction(|state| self.apply_page(state, changes))?;
            report.absorb(page);
            if !more_coming {
                return Ok(report);
            }
        }
    }

    fn apply_page(&self, state: &mut DatabaseState, changes: FetchedChanges) -> WriteResult<PullReport> {
        let order = self.registry.order();
        let mut report = PullReport {
            pages: 1,
            ..PullReport::default()
        };

        let mut deleted = changes.deleted;
        order.sort_children_first(&mut deleted, |id| id.table());
        for identity in &deleted {
            if apply_deletion(state, self.registry, identity)? {
                report.deleted += 1;
            }
        }

        let mut modified = changes.modified;
        order.sort_parents_first(&mut modified, |r| r.table());
        for record in modified {
            let name = record.identity().record_name();
            match apply_record(state, self.registry, record, self.partition, self.policy)? {
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::Staged(reason) => {
                    report.staged += 1;
                    Logger::trace(
                        "RECORD_STAGED",
                        &[("reason", format!("{:?}", reason).as_str()), ("record", name.as_str())],
                    );
                }
                ApplyOutcome::Skipped => {
                    report.skipped += 1;
                    Logger::trace("RECORD_SKIPPED", &[("record", name.as_str())]);
                }
            }
        }

        report.unstaged = retry_staged(state, self.registry, self.partition, self.policy)?;
        state.sync.tokens.set(self.partition, Some(changes.token));
        Ok(report)
    }
}
