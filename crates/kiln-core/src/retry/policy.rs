//! Backoff policy: decides retry budgets and delays.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter.
///
/// After failed attempt `n` (1-indexed) the invoker waits
/// `base_delay * 2^n + random(0..max_jitter)` before the next attempt. The
/// delay is uncapped; `max_retries` bounds it in practice.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempt budget, including the first attempt. Always >= 1.
    pub max_retries: u32,

    /// Unit the exponential curve multiplies.
    pub base_delay: Duration,

    /// Upper bound (exclusive) of the random jitter added to every delay.
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            // A zero budget would never attempt anything.
            max_retries: max_retries.max(1),
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt `n` (1-indexed).
    ///
    /// With the defaults: attempt 1 -> 2s..3s, attempt 2 -> 4s..5s,
    /// attempt 3 -> 8s..9s.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let jitter_ms = rand::thread_rng().gen_range(0..self.max_jitter.as_millis().max(1) as u64);
        self.base_delay.saturating_mul(factor) + Duration::from_millis(jitter_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}
