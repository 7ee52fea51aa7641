//! Observable events
//!
//! Every log line the engine writes carries one of these names.

use std::fmt;

/// Observable events in aerosync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Engine constructed and validated
    EngineCreated,
    /// Engine entered the running state
    EngineRunning,
    /// Engine stopped
    EngineStopped,
    /// Configuration loaded
    ConfigLoaded,
    /// Account unavailable, no remote activity
    AccountUnavailable,

    // Schema
    /// Schema drift reconciled
    SchemaReconciled,

    // Push
    /// Conflict merged into the local row
    ConflictMerged,
    /// Pending change dropped without a remote save
    PendingDropped,
    /// Pending change deferred until the next cycle
    PendingDeferred,
    /// Zone created after the remote reported it missing
    ZoneCreated,
    /// Remote refused a write on permission grounds
    PermissionDenied,
    /// Child kept pending because its parent is not on the remote yet
    ReferenceDeferred,

    // Pull
    /// Remote record staged until it can be applied
    RecordStaged,
    /// Staged record applied
    RecordUnstaged,
    /// Remote record skipped because a local delete is pending
    RecordSkipped,

    // Events and retry
    /// Remote zone deleted
    ZoneDeleted,
    /// Share accepted
    ShareAccepted,
    /// Share created on a root record
    ShareCreated,
    /// Share removed from a root record
    ShareRemoved,
    /// Cycle failed transiently and will be retried
    RetryScheduled,
    /// Retries exhausted
    RetryExhausted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::EngineCreated => "ENGINE_CREATED",
            Event::EngineRunning => "ENGINE_RUNNING",
            Event::EngineStopped => "ENGINE_STOPPED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::AccountUnavailable => "ACCOUNT_UNAVAILABLE",

            Event::SchemaReconciled => "SCHEMA_RECONCILED",

            Event::ConflictMerged => "CONFLICT_MERGED",
            Event::PendingDropped => "PENDING_DROPPED",
            Event::PendingDeferred => "PENDING_DEFERRED",
            Event::ZoneCreated => "ZONE_CREATED",
            Event::PermissionDenied => "PERMISSION_DENIED",
            Event::ReferenceDeferred => "REFERENCE_DEFERRED",

            Event::RecordStaged => "RECORD_STAGED",
            Event::RecordUnstaged => "RECORD_UNSTAGED",
            Event::RecordSkipped => "RECORD_SKIPPED",

            Event::ZoneDeleted => "ZONE_DELETED",
            Event::ShareAccepted => "SHARE_ACCEPTED",
            Event::ShareCreated => "SHARE_CREATED",
            Event::ShareRemoved => "SHARE_REMOVED",
            Event::RetryScheduled => "RETRY_SCHEDULED",
            Event::RetryExhausted => "RETRY_EXHAUSTED",
        }
    }

    /// Events reporting a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Event::RetryExhausted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
