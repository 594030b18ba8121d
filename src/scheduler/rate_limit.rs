//! Per-task-type token bucket rate limiting.
//!
//! Buckets refill continuously from elapsed time, so no ticker is needed.
//! Types without a configured limit are never throttled.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default burst capacity used by [`RateLimiter::set_limit`].
pub const DEFAULT_BURST: u32 = 1;

/// Longest wait ever reported. Very small rates would otherwise produce
/// waits that do not fit in a `Duration`.
pub const MAX_DEFERRAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Buckets start full.
    fn new(refill_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
            .map_or(MAX_DEFERRAL, |wait| wait.min(MAX_DEFERRAL))
    }
}

/// Token bucket limiter keyed by task type.
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit `task_type` to `tokens_per_second` with a burst of one token.
    pub fn set_limit(&self, task_type: impl Into<String>, tokens_per_second: f64) {
        self.set_limit_with_burst(task_type, tokens_per_second, DEFAULT_BURST);
    }

    /// Limit `task_type` with an independent burst capacity.
    /// A non-positive or non-finite rate removes the limit.
    pub fn set_limit_with_burst(
        &self,
        task_type: impl Into<String>,
        tokens_per_second: f64,
        burst: u32,
    ) {
        let task_type = task_type.into();
        if !tokens_per_second.is_finite() || tokens_per_second <= 0.0 {
            self.buckets.remove(&task_type);
            return;
        }
        tracing::debug!(task_type = %task_type, tokens_per_second, burst, "rate limit set");
        self.buckets.insert(task_type, TokenBucket::new(tokens_per_second, burst));
    }

    pub fn clear_limit(&self, task_type: &str) {
        self.buckets.remove(task_type);
    }

    /// Configured rate for `task_type`, if any.
    pub fn limit(&self, task_type: &str) -> Option<f64> {
        self.buckets.get(task_type).map(|b| b.refill_per_sec)
    }

    /// Consume a token for `task_type`. Always true for unlimited types.
    pub fn allow(&self, task_type: &str) -> bool {
        match self.buckets.get_mut(task_type) {
            Some(mut bucket) => bucket.try_take(Instant::now()),
            None => true,
        }
    }

    /// Time until the next token for `task_type` becomes available,
    /// capped at [`MAX_DEFERRAL`].
    pub fn wait_time(&self, task_type: &str) -> Duration {
        match self.buckets.get_mut(task_type) {
            Some(mut bucket) => bucket.wait_time(Instant::now()),
            None => Duration::ZERO,
        }
    }
}
