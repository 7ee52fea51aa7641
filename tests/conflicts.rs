//! Conflict resolution tests
//!
//! Conflicts are detected by the remote through stale change tags and
//! merged field by field on the device that submitted the stale save.

use std::sync::Arc;

use serde_json::{json, Value};

use aerosync::conflict::MissingClockPolicy;
use aerosync::record::{RemoteRecord, ZoneId};
use aerosync::remote::MemoryRemoteStore;
use aerosync::{RecordIdentity, Row, SyncConfig, SyncEngine, SyncTable, TableSchema};

fn tables() -> Vec<SyncTable> {
    vec![SyncTable::private(
        TableSchema::new("notes", "id").column("a").column("b"),
    )]
}

fn engine(remote: &MemoryRemoteStore, policy: MissingClockPolicy) -> SyncEngine {
    let mut config = SyncConfig::new("iCloud.com.example.notes");
    config.missing_clock_policy = policy;
    SyncEngine::new(
        config,
        tables(),
        Arc::new(remote.clone()),
        Arc::new(MemoryRemoteStore::new()),
    )
    .unwrap()
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn seed(remote: &MemoryRemoteStore) -> RecordIdentity {
    let id = RecordIdentity::new("notes", "1");
    remote.put_record(
        RemoteRecord::new(id.clone(), ZoneId::default_zone())
            .with_field("id", json!(1), 1)
            .with_field("a", json!("a0"), 45)
            .with_field("b", json!("b0"), 20),
    );
    id
}

// =============================================================================
// FIELD-LEVEL MERGE
// =============================================================================

/// Test: remote edit of one field and local edit of another both survive.
#[tokio::test]
async fn test_disjoint_field_edits_merge() {
    let remote = MemoryRemoteStore::new();
    let id = seed(&remote);
    let device = engine(&remote, MissingClockPolicy::TreatAsOlder);
    device.start().await.unwrap();

    remote.edit_field(&id, "a", json!("a1"), Some(60));
    device.database().update(&id, row(&[("b", json!("b1"))])).unwrap();

    let report = device.sync_now().await.unwrap();
    assert_eq!(report.private.push.conflicts, 1);
    assert_eq!(report.private.push.saved, 1);

    let local = device.database().get(&id).unwrap();
    assert_eq!(local["a"], json!("a1"));
    assert_eq!(local["b"], json!("b1"));

    let server = remote.record(&id).unwrap();
    assert_eq!(server.value("a"), Some(&json!("a1")));
    assert_eq!(server.value("b"), Some(&json!("b1")));
    assert!(device.database().pending_changes().is_empty());
    assert_eq!(device.metrics().conflicts_merged, 1);
}

/// Test: both sides edit the same field; the newer clock wins.
#[tokio::test]
async fn test_same_field_newer_clock_wins() {
    let remote = MemoryRemoteStore::new();
    let id = seed(&remote);
    let device = engine(&remote, MissingClockPolicy::TreatAsOlder);
    device.start().await.unwrap();

    // Local edit is clocked just above 45; the remote edit is far newer
    device.database().update(&id, row(&[("a", json!("local"))])).unwrap();
    remote.edit_field(&id, "a", json!("remote"), Some(1_000));

    device.sync_now().await.unwrap();
    assert_eq!(device.database().get(&id).unwrap()["a"], json!("remote"));
    assert_eq!(remote.record(&id).unwrap().value("a"), Some(&json!("remote")));
}

/// Test: a server field without a clock loses to a local edit by default.
#[tokio::test]
async fn test_missing_clock_treated_as_older() {
    let remote = MemoryRemoteStore::new();
    let id = seed(&remote);
    let device = engine(&remote, MissingClockPolicy::TreatAsOlder);
    device.start().await.unwrap();

    device.database().update(&id, row(&[("a", json!("local"))])).unwrap();
    remote.edit_field(&id, "a", json!("unclocked"), None);

    device.sync_now().await.unwrap();
    assert_eq!(device.database().get(&id).unwrap()["a"], json!("local"));
    assert_eq!(remote.record(&id).unwrap().value("a"), Some(&json!("local")));
}

/// Test: the opposite policy lets the unclocked server value win.
#[tokio::test]
async fn test_missing_clock_treated_as_newer() {
    let remote = MemoryRemoteStore::new();
    let id = seed(&remote);
    let device = engine(&remote, MissingClockPolicy::TreatAsNewer);
    device.start().await.unwrap();

    device.database().update(&id, row(&[("a", json!("local"))])).unwrap();
    remote.edit_field(&id, "a", json!("unclocked"), None);

    device.sync_now().await.unwrap();
    assert_eq!(device.database().get(&id).unwrap()["a"], json!("unclocked"));
}
