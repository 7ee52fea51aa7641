//! Sync counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one engine
#[derive(Debug, Default)]
pub struct SyncMetrics {
    records_pushed: AtomicU64,
    records_deleted: AtomicU64,
    records_pulled: AtomicU64,
    remote_deletions_applied: AtomicU64,
    conflicts_merged: AtomicU64,
    records_staged: AtomicU64,
    pending_dropped: AtomicU64,
    permission_denials: AtomicU64,
    transient_failures: AtomicU64,
    cycles_completed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_pushed: u64,
    pub records_deleted: u64,
    pub records_pulled: u64,
    pub remote_deletions_applied: u64,
    pub conflicts_merged: u64,
    pub records_staged: u64,
    pub pending_dropped: u64,
    pub permission_denials: u64,
    pub transient_failures: u64,
    pub cycles_completed: u64,
}

fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

impl SyncMetrics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves acknowledged by the remote
    pub fn add_pushed(&self, n: usize) {
        add(&self.records_pushed, n);
    }

    /// Deletes acknowledged by the remote
    pub fn add_deleted(&self, n: usize) {
        add(&self.records_deleted, n);
    }

    /// Remote records applied locally
    pub fn add_pulled(&self, n: usize) {
        add(&self.records_pulled, n);
    }

    /// Remote deletions applied locally
    pub fn add_remote_deletions(&self, n: usize) {
        add(&self.remote_deletions_applied, n);
    }

    /// Conflicts resolved by field merge
    pub fn add_conflicts(&self, n: usize) {
        add(&self.conflicts_merged, n);
    }

    /// Remote records staged
    pub fn add_staged(&self, n: usize) {
        add(&self.records_staged, n);
    }

    /// Pending changes dropped
    pub fn add_dropped(&self, n: usize) {
        add(&self.pending_dropped, n);
    }

    /// Writes refused for lack of permission, locally or remotely
    pub fn add_permission_denials(&self, n: usize) {
        add(&self.permission_denials, n);
    }

    /// Transient remote failures
    pub fn increment_transient_failures(&self) {
        add(&self.transient_failures, 1);
    }

    /// Partition cycles that completed
    pub fn increment_cycles(&self) {
        add(&self.cycles_completed, 1);
    }

    /// Copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            records_pushed: get(&self.records_pushed),
            records_deleted: get(&self.records_deleted),
            records_pulled: get(&self.records_pulled),
            remote_deletions_applied: get(&self.remote_deletions_applied),
            conflicts_merged: get(&self.conflicts_merged),
            records_staged: get(&self.records_staged),
            pending_dropped: get(&self.pending_dropped),
            permission_denials: get(&self.permission_denials),
            transient_failures: get(&self.transient_failures),
            cycles_completed: get(&self.cycles_completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(SyncMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = SyncMetrics::new();
        metrics.add_pushed(3);
        metrics.add_pushed(2);
        metrics.increment_transient_failures();
        metrics.increment_cycles();

        let snap = metrics.snapshot();
        assert_eq!(snap.records_pushed, 5);
        assert_eq!(snap.transient_failures, 1);
        assert_eq!(snap.cycles_completed, 1);
        assert_eq!(snap.records_pulled, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = SyncMetrics::new();
        metrics.add_conflicts(1);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["conflicts_merged"], 1);
    }
}
