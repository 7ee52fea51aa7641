//! Wire-agnostic remote store types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::RemoteErrorCode;
use crate::record::{FieldValue, RecordIdentity, RemoteRecord, ShareHandle, SystemFields, ZoneId};

/// Opaque incremental-fetch position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Wrap a token issued by the remote store
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of remote changes
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedChanges {
    /// Records created or modified since the token
    pub modified: Vec<RemoteRecord>,
    /// Records deleted since the token
    pub deleted: Vec<RecordIdentity>,
    /// Position after this page
    pub token: ChangeToken,
    /// Whether another page follows
    pub more_coming: bool,
}

/// A record save: the OCC header plus only the fields that changed
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSave {
    /// System fields; the change tag is the version the diff is based on
    pub system: SystemFields,
    /// Changed fields with their clocks
    pub fields: BTreeMap<String, FieldValue>,
    /// Share the record should carry after the save
    pub share: Option<ShareHandle>,
}

impl RecordSave {
    /// Identity of the saved record
    pub fn identity(&self) -> &RecordIdentity {
        &self.system.identity
    }
}

/// A record delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDelete {
    /// Record to delete
    pub identity: RecordIdentity,
    /// Zone holding it
    pub zone: ZoneId,
}

/// Saves and deletes submitted together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitBatch {
    /// Saves, parents before children
    pub saves: Vec<RecordSave>,
    /// Deletes, children before parents
    pub deletes: Vec<RecordDelete>,
}

impl SubmitBatch {
    /// Whether the batch carries nothing
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.saves.len() + self.deletes.len()
    }
}

/// Per-identity result of a submitted batch
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Save accepted; the stored record
    Committed(RemoteRecord),
    /// Delete accepted
    Deleted,
    /// The change tag was stale; the server's current record
    Conflict(RemoteRecord),
    /// Rejected
    Failed(RemoteErrorCode),
}

/// Remote account state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Signed in and usable
    Available,
    /// No account on this device
    NoAccount,
    /// Restricted by policy
    Restricted,
    /// Temporarily unusable
    TemporarilyUnavailable,
}

impl AccountStatus {
    /// Whether sync may run
    pub fn is_available(&self) -> bool {
        matches!(self, AccountStatus::Available)
    }

    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::NoAccount => "no_account",
            AccountStatus::Restricted => "restricted",
            AccountStatus::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}
