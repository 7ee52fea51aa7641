//! CLI command implementations
//!
//! Commands only read the state file. They never contact a remote and
//! never write, so they are safe to run next to a live engine.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::engine::SyncConfig;
use crate::local::{DatabaseState, StateFile, STATE_FILE_NAME};
use crate::metadata::{verify, PendingKind};
use crate::record::Partition;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Execute a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Status { config } => status(&config),
        Command::Pending { config } => pending(&config),
        Command::Metadata { config, table } => metadata(&config, table.as_deref()),
        Command::Verify { config } => verify_state(&config),
    }
}

/// Print a summary of the data directory
pub fn status(config_path: &Path) -> CliResult<()> {
    let (dir, state) = load_state(config_path)?;
    let mut report = status_report(&state);
    if let Value::Object(map) = &mut report {
        map.insert("data_dir".into(), json!(dir.display().to_string()));
    }
    write_response(report)
}

/// Print pending changes, oldest first
pub fn pending(config_path: &Path) -> CliResult<()> {
    let (_, state) = load_state(config_path)?;
    write_response(pending_report(&state))
}

/// Print metadata entries, optionally for one table
pub fn metadata(config_path: &Path, table: Option<&str>) -> CliResult<()> {
    let (_, state) = load_state(config_path)?;
    write_response(metadata_report(&state, table))
}

/// Print inconsistencies; fails when any are found
pub fn verify_state(config_path: &Path) -> CliResult<()> {
    let (_, state) = load_state(config_path)?;
    let (report, count) = verify_report(&state);
    write_response(report)?;
    if count > 0 {
        return Err(CliError::inconsistent(count));
    }
    Ok(())
}

fn load_state(config_path: &Path) -> CliResult<(PathBuf, DatabaseState)> {
    let config = SyncConfig::load(config_path)?;
    let dir = config
        .data_dir
        .ok_or_else(|| CliError::config_error("data_dir is required to inspect sync state"))?;
    if !dir.join(STATE_FILE_NAME).exists() {
        return Err(CliError::not_initialized(&dir));
    }
    let state = StateFile::open(&dir)?.load()?;
    Ok((dir, state))
}

pub(crate) fn status_report(state: &DatabaseState) -> Value {
    let sync = &state.sync;

    let mut tables = Map::new();
    for (name, data) in &state.tables {
        tables.insert(name.clone(), json!(data.len()));
    }
    let mut signatures = Map::new();
    for (name, signature) in &sync.signatures {
        signatures.insert(name.clone(), json!(signature.fingerprint()));
    }
    let count_kind = |kind: PendingKind| sync.pending.iter().filter(|p| p.kind == kind).count();
    let token = |partition: Partition| sync.tokens.get(partition).map(|t| t.as_str().to_string());

    json!({
        "tables": tables,
        "metadata": sync.metadata.len(),
        "synced": sync.metadata.iter().filter(|m| m.is_synced()).count(),
        "pending": {
            "save": count_kind(PendingKind::Save),
            "delete": count_kind(PendingKind::Delete),
        },
        "staged": sync.staged.len(),
        "accepted_shares": sync.accepted_shares.len(),
        "clock": sync.clock.current(),
        "tokens": {
            "private": token(Partition::Private),
            "shared": token(Partition::Shared),
        },
        "signatures": signatures,
    })
}

pub(crate) fn pending_report(state: &DatabaseState) -> Value {
    let mut changes: Vec<_> = state.sync.pending.iter().collect();
    changes.sort_by_key(|p| p.sequence);
    Value::Array(
        changes
            .into_iter()
            .map(|p| {
                json!({
                    "record": p.identity.record_name(),
                    "kind": p.kind.as_str(),
                    "sequence": p.sequence,
                    "enqueued_at": p.enqueued_at.to_rfc3339(),
                })
            })
            .collect(),
    )
}

pub(crate) fn metadata_report(state: &DatabaseState, table: Option<&str>) -> Value {
    Value::Array(
        state
            .sync
            .metadata
            .iter()
            .filter(|m| table.map_or(true, |t| m.identity.table() == t))
            .map(|m| {
                json!({
                    "record": m.identity.record_name(),
                    "zone": m.zone.to_string(),
                    "partition": m.partition.as_str(),
                    "parent": m.parent.as_ref().map(|p| p.record_name()),
                    "synced": m.is_synced(),
                    "change_tag": m.change_tag().map(|t| t.to_string()),
                    "modification_clock": m.modification_clock,
                    "share": m.share.as_ref().map(|s| s.id.to_string()),
                    "deleted_locally": m.is_deleted_locally,
                })
            })
            .collect(),
    )
}

pub(crate) fn verify_report(state: &DatabaseState) -> (Value, usize) {
    let issues = verify(state);
    let report = json!({
        "consistent": issues.is_empty(),
        "issues": issues.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
    });
    (report, issues.len())
}
