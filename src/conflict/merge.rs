//! Field-level last-writer-wins merge

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{RemoteRecord, Row};

/// How to treat a server field that carries no logical clock
///
/// Records written by older clients have no per-field clocks. When such a
/// field conflicts with a local edit the clocks cannot be compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingClockPolicy {
    /// The local edit wins
    #[default]
    TreatAsOlder,
    /// The server value wins
    TreatAsNewer,
}

/// Which side won a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWinner {
    /// Both sides hold the same value
    Agree,
    /// Take the server value
    Remote,
    /// Keep the local value
    Local,
}

/// Result of merging one row against a server record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Server values to write into the local row, with their clocks
    pub take_remote: BTreeMap<String, (Value, Option<u64>)>,
    /// Columns where the local value won and must be pushed
    pub keep_local: BTreeSet<String>,
}

impl MergeOutcome {
    /// Whether any local value survived
    pub fn local_won(&self) -> bool {
        !self.keep_local.is_empty()
    }
}

/// Decide one field
///
/// - equal values: nothing to do
/// - server field clocked: larger clock wins, ties go to local
/// - server field unclocked: whichever side left the baseline wins, and
///   `policy` decides when both did
pub fn resolve_field(
    local: &Value,
    local_clock: u64,
    baseline: Option<&Value>,
    server: Option<&Value>,
    server_clock: Option<u64>,
    policy: MissingClockPolicy,
) -> FieldWinner {
    let server = match server {
        Some(v) => v,
        // The server never had the field; nothing to take
        None => return FieldWinner::Local,
    };
    if server == local {
        return FieldWinner::Agree;
    }
    match server_clock {
        Some(clock) if clock > local_clock => FieldWinner::Remote,
        Some(_) => FieldWinner::Local,
        None if baseline == Some(local) => FieldWinner::Remote,
        None if baseline == Some(server) => FieldWinner::Local,
        None => match policy {
            MissingClockPolicy::TreatAsOlder => FieldWinner::Local,
            MissingClockPolicy::TreatAsNewer => FieldWinner::Remote,
        },
    }
}

/// Merge a local row against the server's current record
///
/// `columns` are the local schema's columns; fields the server has but the
/// schema lacks are left to the snapshot.
pub fn merge<'a, I>(
    columns: I,
    local: &Row,
    local_clocks: &BTreeMap<String, u64>,
    baseline: Option<&RemoteRecord>,
    server: &RemoteRecord,
    policy: MissingClockPolicy,
) -> MergeOutcome
where
    I: IntoIterator<Item = &'a str>,
{
    let mut outcome = MergeOutcome::default();
    for column in columns {
        let local_value = local.get(column).cloned().unwrap_or(Value::Null);
        let winner = resolve_field(
            &local_value,
            local_clocks.get(column).copied().unwrap_or(0),
            baseline.and_then(|b| b.value(column)),
            server.value(column),
            server.field_clock(column),
            policy,
        );
        match winner {
            FieldWinner::Agree => {}
            FieldWinner::Remote => {
                if let Some(value) = server.value(column) {
                    outcome.take_remote.insert(
                        column.to_string(),
                        (value.clone(), server.field_clock(column)),
                    );
                }
            }
            FieldWinner::Local => {
                outcome.keep_local.insert(column.to_string());
            }
        }
    }
    outcome
}
