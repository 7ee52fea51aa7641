//! Sync engine lifecycle and cycle scheduling

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join;
use tokio::sync::Notify;

use super::config::SyncConfig;
use super::errors::{SyncError, SyncResult};
use super::events::{SyncEvent, ZoneDeletionReason};
use super::retry::RetryPolicy;
use crate::capture::{forget, WriteContext};
use crate::local::{DatabaseState, LocalDatabase, SyncedDatabase, WriteResult, WriteSession};
use crate::metadata::PendingKind;
use crate::observability::{
    log_event, log_event_with_fields, warn_event, Event, Logger, MetricsSnapshot, ObservationScope,
    Severity, SyncMetrics,
};
use crate::pull::{PullPipeline, PullReport};
use crate::push::{PushPipeline, PushReport};
use crate::reconcile::{ReconcileReport, SchemaReconciler};
use crate::record::{Partition, RecordIdentity, ShareHandle, ShareMetadata, ZoneId};
use crate::remote::RemoteStore;
use crate::schema::{SchemaRegistry, SyncTable};
use crate::sharing::SharingController;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No remote activity; local writes still capture
    Stopped,
    /// `start` is reconciling and running the first cycle
    Starting,
    /// Cycles run on demand and on events
    Running,
}

impl EngineState {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
        }
    }
}

/// Result of one push-then-pull cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub push: PushReport,
    pub pull: PullReport,
}

/// Result of syncing both partitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub private: CycleReport,
    /// `None` when nothing is shared with this user
    pub shared: Option<CycleReport>,
}

struct PartitionRunner {
    partition: Partition,
    remote: Arc<dyn RemoteStore>,
    lock: tokio::sync::Mutex<()>,
}

impl PartitionRunner {
    fn new(partition: Partition, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            partition,
            remote,
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

/// Keeps the local database and the remote store converged
///
/// The private and shared partitions each run through their own lock, so
/// cycles for one partition never overlap while the two partitions proceed
/// concurrently.
pub struct SyncEngine {
    config: SyncConfig,
    db: SyncedDatabase,
    private: PartitionRunner,
    shared: PartitionRunner,
    state: Mutex<EngineState>,
    metrics: Arc<SyncMetrics>,
    retry: RetryPolicy,
    shutdown: Notify,
}

impl SyncEngine {
    /// Validate configuration and tables, then open the local database
    ///
    /// No remote call is made until `start`.
    pub fn new(
        config: SyncConfig,
        tables: Vec<SyncTable>,
        private: Arc<dyn RemoteStore>,
        shared: Arc<dyn RemoteStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Logger::set_min_severity(config.severity().unwrap_or(Severity::Info));

        let registry = SchemaRegistry::new(tables)?;
        let db = match &config.data_dir {
            Some(dir) => LocalDatabase::open(dir)?,
            None => LocalDatabase::in_memory(),
        };

        log_event_with_fields(
            Event::EngineCreated,
            &[
                ("container", config.container_id.as_str()),
                ("durable", if db.is_durable() { "true" } else { "false" }),
                ("tables", registry.tables().count().to_string().as_str()),
            ],
        );

        Ok(Self {
            retry: RetryPolicy::from_config(&config.retry),
            config,
            db: SyncedDatabase::new(Arc::new(db), Arc::new(registry)),
            private: PartitionRunner::new(Partition::Private, private),
            shared: PartitionRunner::new(Partition::Shared, shared),
            state: Mutex::new(EngineState::Stopped),
            metrics: Arc::new(SyncMetrics::new()),
            shutdown: Notify::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: EngineState) {
        *self.lock_state() = next;
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    /// Whether cycles may run
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Application-facing database handle
    pub fn database(&self) -> &SyncedDatabase {
        &self.db
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reconcile schema, check the account, ensure the default zone,
    /// then push and pull once before entering `Running`
    ///
    /// Calling `start` on a running engine does nothing.
    pub async fn start(&self) -> SyncResult<SyncReport> {
        {
            let mut state = self.lock_state();
            if *state != EngineState::Stopped {
                return Ok(SyncReport::default());
            }
            *state = EngineState::Starting;
        }

        let scope = ObservationScope::with_fields("ENGINE_START", &[("container", self.config.container_id.as_str())]);
        match self.start_inner().await {
            Ok(report) => {
                self.set_state(EngineState::Running);
                scope.complete();
                log_event(Event::EngineRunning);
                Ok(report)
            }
            Err(e) => {
                self.set_state(EngineState::Stopped);
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> SyncResult<SyncReport> {
        self.reconcile()?;
        self.check_account().await?;
        self.private.remote.create_zone(ZoneId::default_zone()).await?;
        self.sync_all().await
    }

    /// Compare cached table signatures with the registered tables
    pub fn reconcile(&self) -> WriteResult<ReconcileReport> {
        SchemaReconciler::new(self.db.local(), self.db.registry(), self.config.missing_clock_policy)
            .reconcile()
    }

    async fn check_account(&self) -> SyncResult<()> {
        let status = self.private.remote.account_status().await?;
        if status.is_available() {
            return Ok(());
        }
        warn_event(Event::AccountUnavailable, &[("status", status.as_str())]);
        Err(SyncError::AccountUnavailable(status))
    }

    /// Stop remote activity; pending changes stay queued
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), EngineState::Stopped);
        self.shutdown.notify_waiters();
        if previous != EngineState::Stopped {
            log_event(Event::EngineStopped);
        }
    }

    /// Run a cycle for each active partition now
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        if !self.is_running() {
            return Err(SyncError::Stopped);
        }
        self.sync_all().await
    }

    fn shared_active(&self) -> bool {
        self.db.local().read(|s| {
            !s.sync.accepted_shares.is_empty()
                || s.sync.metadata.iter().any(|m| m.partition == Partition::Shared)
        })
    }

    async fn sync_all(&self) -> SyncResult<SyncReport> {
        if !self.shared_active() {
            let private = self.cycle(&self.private).await?;
            return Ok(SyncReport { private, shared: None });
        }
        let (private, shared) = join(self.cycle(&self.private), self.cycle(&self.shared)).await;
        Ok(SyncReport {
            private: private?,
            shared: Some(shared?),
        })
    }

    fn runner(&self, partition: Partition) -> &PartitionRunner {
        match partition {
            Partition::Private => &self.private,
            Partition::Shared => &self.shared,
        }
    }

    /// Push then pull one partition, retrying transient failures
    async fn cycle(&self, runner: &PartitionRunner) -> SyncResult<CycleReport> {
        let _guard = runner.lock.lock().await;
        let mut attempt = 0;
        loop {
            match self.cycle_once(runner).await {
                Ok(report) => {
                    self.record_metrics(&report);
                    return Ok(report);
                }
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts() => {
                    self.metrics.increment_transient_failures();
                    let delay = self.retry.delay(attempt, e.retry_after());
                    warn_event(
                        Event::RetryScheduled,
                        &[
                            ("attempt", (attempt + 1).to_string().as_str()),
                            ("code", e.code()),
                            ("delay_ms", delay.as_millis().to_string().as_str()),
                            ("partition", runner.partition.as_str()),
                        ],
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        self.metrics.increment_transient_failures();
                        Logger::error(
                            Event::RetryExhausted.as_str(),
                            &[
                                ("attempts", (attempt + 1).to_string().as_str()),
                                ("code", e.code()),
                                ("partition", runner.partition.as_str()),
                            ],
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn cycle_once(&self, runner: &PartitionRunner) -> SyncResult<CycleReport> {
        let push = PushPipeline::new(
            self.db.local(),
            self.db.registry(),
            runner.remote.as_ref(),
            runner.partition,
            self.config.missing_clock_policy,
            self.config.max_conflict_rounds,
        )
        .run()
        .await?;
        let pull = PullPipeline::new(
            self.db.local(),
            self.db.registry(),
            runner.remote.as_ref(),
            runner.partition,
            self.config.missing_clock_policy,
        )
        .run()
        .await?;
        Ok(CycleReport { push, pull })
    }

    fn record_metrics(&self, report: &CycleReport) {
        let m = &self.metrics;
        m.increment_cycles();
        m.add_pushed(report.push.saved);
        m.add_deleted(report.push.deleted);
        m.add_conflicts(report.push.conflicts);
        m.add_dropped(report.push.dropped);
        m.add_permission_denials(report.push.permission_denied);
        m.add_pulled(report.pull.applied + report.pull.unstaged);
        m.add_remote_deletions(report.pull.deleted);
        m.add_staged(report.pull.staged);
    }

    /// React to a notification
    ///
    /// While stopped, events that would cause remote activity are ignored;
    /// local bookkeeping for zone deletions still happens.
    pub async fn handle(&self, event: SyncEvent) -> SyncResult<()> {
        match event {
            SyncEvent::LocalChangesPending => {
                if self.is_running() {
                    self.sync_all().await?;
                }
            }
            SyncEvent::RemoteChangesAvailable { partition } => {
                if self.is_running() {
                    self.cycle(self.runner(partition)).await?;
                }
            }
            SyncEvent::AccountStatusChanged => {
                if self.is_running() {
                    if let Err(e) = self.check_account().await {
                        self.stop();
                        return Err(e);
                    }
                    self.sync_all().await?;
                }
            }
            SyncEvent::ZoneDeleted {
                partition,
                zone,
                reason,
            } => {
                self.zone_deleted(partition, &zone, reason).await?;
            }
            SyncEvent::ShareAccepted(metadata) => {
                self.accept_share(metadata).await?;
            }
        }
        Ok(())
    }

    async fn zone_deleted(
        &self,
        partition: Partition,
        zone: &ZoneId,
        reason: ZoneDeletionReason,
    ) -> SyncResult<()> {
        let runner = self.runner(partition);
        let affected = {
            let _guard = runner.lock.lock().await;
            self.db.local().transaction(|state| {
                let affected = match reason {
                    ZoneDeletionReason::UserDeleted | ZoneDeletionReason::Purged => {
                        purge_zone(state, self.db.registry(), zone)?
                    }
                    ZoneDeletionReason::EncryptedDataReset => reupload_zone(state, zone),
                };
                state.sync.tokens.set(partition, None);
                Ok::<_, SyncError>(affected)
            })?
        };

        log_event_with_fields(
            Event::ZoneDeleted,
            &[
                ("partition", partition.as_str()),
                ("reason", reason.as_str()),
                ("records", affected.to_string().as_str()),
                ("zone", zone.name.as_str()),
            ],
        );

        if reason == ZoneDeletionReason::EncryptedDataReset && self.is_running() {
            self.cycle(runner).await?;
        }
        Ok(())
    }

    /// Share a root record through the private store
    pub async fn share(&self, table: &str, primary_key: &str) -> SyncResult<ShareHandle> {
        let handle = self
            .sharing()
            .share(self.private.remote.as_ref(), table, primary_key)
            .await?;
        Ok(handle)
    }

    /// Remove the share of a root record
    pub fn stop_sharing(&self, identity: &RecordIdentity) -> SyncResult<ShareHandle> {
        Ok(self.sharing().stop_sharing(identity)?)
    }

    /// Accept another user's share and pull its records when running
    pub async fn accept_share(&self, metadata: ShareMetadata) -> SyncResult<ZoneId> {
        let zone = self
            .sharing()
            .accept_share(self.shared.remote.as_ref(), metadata)
            .await?;
        if self.is_running() {
            self.cycle(&self.shared).await?;
        }
        Ok(zone)
    }

    fn sharing(&self) -> SharingController<'_> {
        SharingController::new(self.db.local(), self.db.registry())
    }

    /// Run cycles whenever local writes are captured, until `stop`
    ///
    /// Cycle failures are logged and do not end the loop.
    pub async fn run(&self) -> SyncResult<()> {
        if !self.is_running() {
            return Err(SyncError::Stopped);
        }
        let changes = self.db.changes();
        loop {
            tokio::select! {
                _ = changes.notified() => {
                    if let Err(e) = self.handle(SyncEvent::LocalChangesPending).await {
                        Logger::warn(
                            "SYNC_CYCLE_FAILED",
                            &[("code", e.code()), ("error", e.to_string().as_str())],
                        );
                    }
                }
                _ = self.shutdown.notified() => return Ok(()),
            }
            if !self.is_running() {
                return Ok(());
            }
        }
    }
}

/// Delete every local row of a zone the remote no longer has
fn purge_zone(state: &mut DatabaseState, registry: &SchemaRegistry, zone: &ZoneId) -> WriteResult<usize> {
    let mut identities = state.sync.metadata.in_zone(zone);
    registry
        .order()
        .sort_children_first(&mut identities, |id| id.table());

    for identity in &identities {
        if state.has_row(identity) && registry.contains(identity.table()) {
            WriteSession::new(state, registry, WriteContext::remote()).delete(identity)?;
        }
        forget(&mut state.sync, identity);
    }
    state.sync.accepted_shares.retain(|s| &s.zone != zone);
    Ok(identities.len())
}

/// Forget what the remote knew about a zone and queue its rows again
fn reupload_zone(state: &mut DatabaseState, zone: &ZoneId) -> usize {
    let identities = state.sync.metadata.in_zone(zone);
    for identity in &identities {
        if let Some(meta) = state.sync.metadata.get_mut(identity) {
            meta.clear_snapshots();
        }
        if state.has_row(identity) {
            state.sync.pending.enqueue(identity.clone(), PendingKind::Save);
        }
    }
    identities.len()
}
