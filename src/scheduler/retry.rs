//! Retry policy with exponential backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::task::TaskError;

/// Exponential backoff configuration.
///
/// The delay before retry `k` (1-indexed) is `base_delay * 2^(k-1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction in `[0.0, 1.0]`. 0 keeps delays exact.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after `delay`; `retry` is the 1-indexed retry number.
    Retry { retry: u32, delay: Duration },
    /// Publish a terminal failure.
    GiveUp,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self { base_delay, max_delay, jitter: 0.0 }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Backoff before the `retry`-th retry (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        self.apply_jitter(delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0))
    }

    /// Decide whether a failure after `retries_so_far` retries gets another attempt.
    pub fn decide(&self, error: &TaskError, retries_so_far: u32, max_retries: u32) -> RetryDecision {
        if !error.is_retryable() || retries_so_far >= max_retries {
            return RetryDecision::GiveUp;
        }
        let retry = retries_so_far + 1;
        RetryDecision::Retry { retry, delay: self.delay_for(retry) }
    }
}
