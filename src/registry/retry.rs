//! Backoff computation for transiently failed registry operations. The
//! scheduler stores the next attempt time rather than sleeping in place, so
//! this module only computes delays.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff with full jitter, capped. `attempt` is the number of
/// failures so far (first retry is attempt 1).
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.base_delay().as_millis() as u64;
    let cap = config.max_delay().as_millis() as u64;
    let exponent = attempt.saturating_sub(1).min(32);
    let raw = base.saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
    let capped = raw.min(cap).max(base);

    let millis = if config.jitter {
        rand::rng().random_range(base.min(capped)..=capped)
    } else {
        capped
    };
    Duration::from_millis(millis)
}

/// Whether a failed operation has exhausted its automatic retries and should
/// be parked for operator attention.
pub fn attempts_exhausted(config: &RetryConfig, attempts: u32) -> bool {
    attempts >= config.max_attempts
}
