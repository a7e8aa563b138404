//! Retry pacing.
//!
//! Exponential back-off with a little random jitter so that recipes
//! retrying against the same protected host do not fire in lockstep.

use rand::Rng;
use std::time::Duration;

/// Generate a random delay between min_ms and max_ms.
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(ms)
}

/// Back-off before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `cap`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// [`backoff_delay`] plus up to 250ms of jitter, still capped at `cap`.
pub fn jittered_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    (backoff_delay(attempt, base, cap) + random_delay(0, 250)).min(cap)
}
