//! Retry schedule for queued items.

use std::time::Duration;

use timeclock_core::Tunables;

/// Capped exponential backoff with an attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Maximum delay between attempts.
    pub cap: Duration,
    /// Attempts after which an item is parked as dead.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&Tunables::default())
    }
}

impl From<&Tunables> for RetryPolicy {
    fn from(t: &Tunables) -> Self {
        Self {
            base: Duration::from_secs(t.backoff_base_secs),
            cap: Duration::from_secs(t.backoff_cap_secs),
            max_attempts: t.max_sync_attempts,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure: `0` for zero failures, then
    /// `base * 2^(attempt - 1)`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Unix time of the next attempt after the `attempt`-th failure at `now`.
    pub fn next_attempt_at(&self, attempt: u32, now: i64) -> i64 {
        let secs = i64::try_from(self.delay(attempt).as_secs()).unwrap_or(i64::MAX);
        now.saturating_add(secs)
    }

    /// Whether an item with `attempts` failures should stop being retried.
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
