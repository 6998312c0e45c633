//! Reconnection backoff strategies.
//!
//! A [`Backoff`] answers two questions for the connection manager:
//!
//! - How long should I wait before retry attempt `n`?
//! - Is attempt `n` still allowed, or have retries been exhausted?
//!
//! Strategies are pure: no clocks, no I/O, no interior state.  The
//! connection manager tracks the attempt counter itself and feeds it in,
//! so the same strategy value can be shared across threads without
//! synchronisation.

use std::time::Duration;

/// Default base delay between reconnection attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A retry-delay strategy.
///
/// Implementations must be deterministic and monotonically non-decreasing
/// in `attempt` so observers can reason about retry schedules.
pub trait Backoff: Send + Sync {
    /// Returns the delay to wait before attempt number `attempt`
    /// (0-based, counted since the last successful connection).
    fn next_delay(&self, attempt: u32) -> Duration;

    /// Returns `true` while attempt number `attempt` is still permitted.
    fn has_next_attempt(&self, attempt: u32) -> bool;
}

/// Exponential backoff: `base_delay * 2^attempt`, saturating.
///
/// No jitter is applied; with a single client per printer host there is no
/// thundering-herd concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_retries: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES)
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        // Saturate both the shift and the multiply: a pathological attempt
        // counter must clamp to a huge delay, not wrap around to a tiny one.
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn has_next_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Constant backoff: the same delay before every attempt.
///
/// Mostly useful on low-latency LANs and in tests, where exponential
/// growth only slows things down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBackoff {
    delay: Duration,
    max_retries: u32,
}

impl ConstantBackoff {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl Backoff for ConstantBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn has_next_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_per_attempt() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), 5);

        assert_eq!(backoff.next_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_is_non_decreasing() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(250), 10);

        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = backoff.next_delay(attempt);
            assert!(
                delay >= previous,
                "delay must never shrink between attempts"
            );
            previous = delay;
        }
    }

    #[test]
    fn test_exponential_backoff_saturates_instead_of_overflowing() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(1), 100);

        // 2^80 overflows u32; the delay must clamp, not wrap.
        let huge = backoff.next_delay(80);
        assert!(huge >= backoff.next_delay(31));
    }

    #[test]
    fn test_has_next_attempt_boundary() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), 3);

        assert!(backoff.has_next_attempt(0));
        assert!(backoff.has_next_attempt(2));
        assert!(!backoff.has_next_attempt(3));
        assert!(!backoff.has_next_attempt(4));
    }

    #[test]
    fn test_default_matches_documented_values() {
        let backoff = ExponentialBackoff::default();

        assert_eq!(backoff.next_delay(0), Duration::from_millis(1000));
        assert!(backoff.has_next_attempt(2));
        assert!(!backoff.has_next_attempt(3));
    }

    #[test]
    fn test_constant_backoff_ignores_attempt_counter() {
        let backoff = ConstantBackoff::new(Duration::from_millis(50), 2);

        assert_eq!(backoff.next_delay(0), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(17), Duration::from_millis(50));
        assert!(backoff.has_next_attempt(1));
        assert!(!backoff.has_next_attempt(2));
    }
}
