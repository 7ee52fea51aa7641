//! Observability subsystem for aerosync
//!
//! Structured JSON logs, typed event names, begin/complete scopes and
//! sync counters.
//!
//! # Principles
//!
//! 1. Observability is read-only; it never changes sync behavior
//! 2. No background threads
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use aerosync::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::RecordStaged, &[("record", "7:items")]);
//!
//! let scope = ObservationScope::new("PULL");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use scope::{ObservationScope, Timer};

/// Log an event at its default severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log an event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_error() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log an event at WARN
pub fn warn_event(event: Event, fields: &[(&str, &str)]) {
    Logger::warn(event.as_str(), fields);
}
