//! Logical modification clock
//!
//! A Lamport clock persisted with the sync state. It never consults wall
//! time and never moves backward:
//!
//! - a local write stamps `max(clock, row clock) + 1`
//! - applying a remote record observes its largest field clock, so the next
//!   local edit is ordered after everything this replica has seen

use serde::{Deserialize, Serialize};

/// Process-persistent logical clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalClock(u64);

impl LogicalClock {
    /// Create a clock at zero
    pub fn new() -> Self {
        Self(0)
    }

    /// Current value
    pub fn current(&self) -> u64 {
        self.0
    }

    /// Advance past both the clock and `floor`, returning the new stamp
    pub fn tick(&mut self, floor: u64) -> u64 {
        self.0 = self.0.max(floor).saturating_add(1);
        self.0
    }

    /// Merge in a clock value seen elsewhere
    pub fn observe(&mut self, seen: u64) {
        self.0 = self.0.max(seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut clock = LogicalClock::new();
        let a = clock.tick(0);
        let b = clock.tick(0);
        assert!(b > a);
    }

    #[test]
    fn test_tick_passes_floor() {
        let mut clock = LogicalClock::new();
        assert_eq!(clock.tick(40), 41);
        assert_eq!(clock.tick(10), 42);
    }

    #[test]
    fn test_observe_never_moves_backward() {
        let mut clock = LogicalClock::new();
        clock.observe(60);
        clock.observe(30);
        assert_eq!(clock.current(), 60);
        assert_eq!(clock.tick(0), 61);
    }
}
