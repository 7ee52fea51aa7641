//! Exponential backoff with jitter

use std::time::Duration;

use rand::Rng;

use super::config::RetryConfig;

/// Delay schedule for retrying a failed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            max_attempts: config.max_attempts,
            jitter: config.jitter,
        }
    }

    /// Total attempts allowed, the first included
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the delay after failed attempt `attempt` (0-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next attempt
    ///
    /// With jitter the delay is drawn from the upper half of the ceiling.
    /// A server-requested delay is always honoured.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let ceiling = self.ceiling(attempt);
        let delay = if self.jitter && !ceiling.is_zero() {
            let millis = ceiling.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
        } else {
            ceiling
        };
        match retry_after {
            Some(requested) => delay.max(requested),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            max_attempts: 4,
            jitter,
        })
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = policy(false);
        assert_eq!(p.delay(0, None), Duration::from_millis(100));
        assert_eq!(p.delay(1, None), Duration::from_millis(200));
        assert_eq!(p.delay(3, None), Duration::from_millis(800));
        assert_eq!(p.delay(4, None), Duration::from_millis(1_000));
        assert_eq!(p.delay(40, None), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let p = policy(true);
        for _ in 0..50 {
            let d = p.delay(2, None);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_retry_after_is_honoured() {
        let p = policy(false);
        assert_eq!(p.delay(0, Some(Duration::from_secs(3))), Duration::from_secs(3));
    }
}
