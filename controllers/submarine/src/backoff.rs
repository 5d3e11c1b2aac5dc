//! # Exponential Backoff
//!
//! Per-key retry delays for the work queue. A key that keeps failing waits
//! `base * 2^failures`, capped at `max`; a successful pass forgets the count
//! and the next failure starts again from `base`.
//!
//! Sequence with the default 5ms base: 5ms, 10ms, 20ms, 40ms, ... 1000s (max).

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay for the first retry
    base: Duration,
    /// Maximum delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff with the given first delay and cap
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Calculate the delay for a key that has already failed `failures` times (stateless)
    ///
    /// `failures == 0` yields `base`; each further failure doubles the delay
    /// until it reaches `max`.
    #[must_use]
    pub fn for_failures(&self, failures: u32) -> Duration {
        // 2^31 * base is far past any sane cap already
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
