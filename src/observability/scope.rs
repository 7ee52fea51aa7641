//! Begin/complete logging around a unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` with `elapsed_ms` on `complete()`
//! - `{name}_FAILED` on `fail()`
//! - `{name}_INCOMPLETE` if dropped unfinished (a cancelled cycle)

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs its start and its outcome
///
/// ```ignore
/// let scope = ObservationScope::with_fields("PUSH", &[("partition", "private")]);
/// // ... do work ...
/// scope.complete_with_fields(&[("saved", "3")]);
/// ```
pub struct ObservationScope {
    name: String,
    fields: Vec<(String, String)>,
    timer: Timer,
    completed: bool,
}

impl ObservationScope {
    /// Open a scope with no fields
    pub fn new(name: &str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Open a scope; `fields` are repeated on every line it writes
    pub fn with_fields(name: &str, fields: &[(&str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timer: Timer::new(),
            completed: false,
        }
    }

    fn fields_with<'a>(&'a self, extra: &[(&'a str, &'a str)], elapsed: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut all: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        all.extend(extra.iter().copied());
        all.push(("elapsed_ms", elapsed));
        all
    }

    /// Close the scope successfully
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Close the scope successfully with result fields
    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.timer.elapsed_ms();
        let fields = self.fields_with(extra, &elapsed);
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Close the scope with a failure
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        let elapsed = self.timer.elapsed_ms();
        let fields = self.fields_with(&[("reason", reason)], &elapsed);
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    /// Whether the scope has been closed
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            let fields: Vec<(&str, &str)> = self
                .fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &fields);
        }
    }
}

/// Wall-clock duration timer
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lifecycle() {
        let scope = ObservationScope::with_fields("TEST", &[("partition", "private")]);
        assert!(!scope.is_completed());
        scope.complete_with_fields(&[("saved", "2")]);
    }

    #[test]
    fn test_scope_fail_and_drop() {
        ObservationScope::new("TEST").fail("boom");
        drop(ObservationScope::new("TEST"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let ms: u64 = timer.elapsed_ms().parse().unwrap();
        assert!(ms >= 5);
    }
}
