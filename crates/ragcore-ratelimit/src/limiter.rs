//! Fixed-window rate limiter over the Cache Backend (C3, spec §4.4).
//! Grounded on `TokenBucketRateLimiter.check()` from the original `shu`
//! backend's `core/rate_limiting.py`: despite the Python class's name the
//! algorithm is a fixed window, not a token bucket — increment-then-check,
//! with a compensating decrement on overflow and fail-open on cache errors.

use std::sync::Arc;
use std::time::Duration;

use ragcore_infra::{Cache, CacheError};
use tracing::error;

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub retry_after_seconds: u64,
    pub remaining: i64,
    pub limit: u64,
    pub reset_seconds: u64,
}

impl RateLimitResult {
    /// Header names from spec §4.4/§6 — note: no `X-` prefix, unlike the
    /// generic `X-RateLimit-*` convention some HTTP frameworks default to.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("RateLimit-Limit", self.limit.to_string()),
            ("RateLimit-Remaining", self.remaining.max(0).to_string()),
            ("RateLimit-Reset", self.reset_seconds.to_string()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", self.retry_after_seconds.to_string()));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub namespace: String,
    pub capacity: u64,
    pub refill_per_second: f64,
}

impl RateLimitConfig {
    pub fn new(namespace: impl Into<String>, capacity: u64, refill_per_second: f64) -> Self {
        Self {
            namespace: namespace.into(),
            capacity: capacity.max(1),
            refill_per_second: refill_per_second.max(0.001),
        }
    }

    /// `window_size = max(60, ceil(capacity / refill_per_second))` seconds (spec §4.4).
    pub fn window_size_seconds(&self) -> u64 {
        let computed = (self.capacity as f64 / self.refill_per_second).ceil() as u64;
        computed.max(60)
    }
}

/// The primitive fixed-window limiter. Specialized limiters (API, auth, LLM
/// RPM/TPM) are thin configuration wrappers around one of these (spec §4.4).
pub struct FixedWindowRateLimiter {
    cache: Arc<dyn Cache>,
    config: RateLimitConfig,
}

impl FixedWindowRateLimiter {
    pub fn new(cache: Arc<dyn Cache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn window_key(&self, bucket: &str, window_size: u64, now_epoch_seconds: u64) -> String {
        let window_index = now_epoch_seconds / window_size;
        format!("{}:{bucket}:fw:{window_index}", self.config.namespace)
    }

    /// Checks and accounts one request of `cost` against `bucket`. Overrides
    /// let callers vary capacity/refill per call (e.g. per-provider LLM
    /// quotas) without constructing a new limiter (spec §4.4 "Per-provider
    /// capacities come from caller-supplied overrides").
    pub async fn check(
        &self,
        bucket: &str,
        cost: i64,
        capacity_override: Option<u64>,
        refill_override: Option<f64>,
    ) -> RateLimitResult {
        let capacity = capacity_override.unwrap_or(self.config.capacity).max(1);
        let refill = refill_override
            .unwrap_or(self.config.refill_per_second)
            .max(0.001);
        let window_size = ((capacity as f64 / refill).ceil() as u64).max(60);
        let now = now_epoch_seconds();
        let key = self.window_key(bucket, window_size, now);

        match self.cache.incr(&key, cost).await {
            Ok(new_count) => {
                if new_count == cost {
                    if let Err(e) = self.cache.expire(&key, Duration::from_secs(window_size)).await {
                        error!(error = %e, key = %key, "failed to set expiry on fresh rate-limit window");
                    }
                }
                if new_count <= capacity as i64 {
                    RateLimitResult {
                        allowed: true,
                        retry_after_seconds: 0,
                        remaining: capacity as i64 - new_count,
                        limit: capacity,
                        reset_seconds: window_size,
                    }
                } else {
                    if let Err(decr_err) = self.cache.decr(&key, cost).await {
                        error!(error = %decr_err, key = %key, "failed to compensate rate-limit overflow");
                    }
                    RateLimitResult {
                        allowed: false,
                        retry_after_seconds: window_size,
                        remaining: 0,
                        limit: capacity,
                        reset_seconds: window_size,
                    }
                }
            }
            Err(e) => {
                self.log_failure(&e);
                // Fail-open: availability choice, not a correctness one (spec §4.4, design notes).
                RateLimitResult {
                    allowed: true,
                    retry_after_seconds: 0,
                    remaining: capacity as i64,
                    limit: capacity,
                    reset_seconds: window_size,
                }
            }
        }
    }

    fn log_failure(&self, e: &CacheError) {
        error!(error = %e, "rate limiter cache call failed; allowing request (fail-open)");
    }
}

fn now_epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
