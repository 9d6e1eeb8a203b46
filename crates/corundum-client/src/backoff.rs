//! Retry and refresh jitter policies.
//!
//! Two distinct strategies for two distinct purposes, kept separate on
//! purpose:
//! - [`full_jitter`] spaces token-fetch retries: the delay is sampled
//!   uniformly between zero and the full exponential ceiling, so
//!   concurrent clients don't retry in lockstep.
//! - [`refresh_delay`] schedules proactive token renewal at 90-95% of the
//!   token's lifetime, so renewal lands before expiry and is staggered
//!   across processes.

use std::time::Duration;

use rand::Rng;

/// Full-jitter exponential backoff for retry `attempt` (0-based).
///
/// Returns a duration sampled uniformly from `[0, 2^attempt * base)`.
/// Never negative, never NaN.
pub fn full_jitter(attempt: u32, base: Duration) -> Duration {
    let ceiling = base.saturating_mul(2u32.saturating_pow(attempt));
    ceiling.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
}

/// Delay before proactively refreshing a token that expires in
/// `expires_in`: a uniform sample from `[0.90, 0.95)` of the lifetime.
pub fn refresh_delay(expires_in: Duration) -> Duration {
    expires_in.mul_f64(rand::thread_rng().gen_range(0.90..0.95))
}
