//! Specialized limiters composing the fixed-window primitive (spec §4.4):
//! general API (per-user), strict auth (per-identifier, small capacity,
//! slow refill), and per-`(user, provider)` LLM RPM/TPM. Grounded on
//! `RateLimitService`'s lazy-limiter-init shape in the original
//! `core/rate_limiting.py`, and on the naming conventions of
//! `copilot_security::rate_limit::RateLimitManager`.

use std::sync::Arc;

use dashmap::DashMap;
use ragcore_core::config::RateLimitConfig as AppRateLimitConfig;
use ragcore_infra::Cache;

use crate::limiter::{FixedWindowRateLimiter, RateLimitConfig, RateLimitResult};

/// One provider's RPM/TPM capacities, supplied by the caller so providers
/// can be configured independently of each other (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct ProviderLimits {
    pub rpm_capacity: u64,
    pub tpm_capacity: u64,
}

/// Facade over the four limiter roles the rest of the system needs:
/// general API, strict auth, and per-provider LLM RPM/TPM. All four share
/// one cache backend so a single outage degrades them uniformly (fail-open).
pub struct RateLimitService {
    api: FixedWindowRateLimiter,
    auth: FixedWindowRateLimiter,
    llm_rpm: FixedWindowRateLimiter,
    llm_tpm: FixedWindowRateLimiter,
    provider_limits: DashMap<String, ProviderLimits>,
    enabled: bool,
}

impl RateLimitService {
    pub fn new(cache: Arc<dyn Cache>, config: &AppRateLimitConfig) -> Self {
        Self {
            api: FixedWindowRateLimiter::new(
                cache.clone(),
                RateLimitConfig::new("rl:api", config.api_capacity, config.api_refill_per_second),
            ),
            auth: FixedWindowRateLimiter::new(
                cache.clone(),
                RateLimitConfig::new(
                    "rl:auth",
                    config.auth_capacity,
                    config.auth_refill_per_second,
                ),
            ),
            llm_rpm: FixedWindowRateLimiter::new(
                cache.clone(),
                RateLimitConfig::new("rl:llm_rpm", config.llm_rpm_default_capacity, 1.0),
            ),
            llm_tpm: FixedWindowRateLimiter::new(
                cache,
                RateLimitConfig::new("rl:llm_tpm", config.llm_tpm_default_capacity, 1.0),
            ),
            provider_limits: DashMap::new(),
            enabled: config.enabled,
        }
    }

    pub fn set_provider_limits(&self, provider: impl Into<String>, limits: ProviderLimits) {
        self.provider_limits.insert(provider.into(), limits);
    }

    fn provider_limits_for(&self, provider: &str) -> Option<ProviderLimits> {
        self.provider_limits.get(provider).map(|r| *r)
    }

    async fn allow_all(&self, limit: u64) -> RateLimitResult {
        RateLimitResult {
            allowed: true,
            retry_after_seconds: 0,
            remaining: limit as i64,
            limit,
            reset_seconds: 60,
        }
    }

    pub async fn check_api(&self, user_id: &str) -> RateLimitResult {
        if !self.enabled {
            return self.allow_all(self.api_capacity()).await;
        }
        self.api.check(user_id, 1, None, None).await
    }

    pub async fn check_auth(&self, identifier: &str) -> RateLimitResult {
        if !self.enabled {
            return self.allow_all(self.auth_capacity()).await;
        }
        self.auth.check(identifier, 1, None, None).await
    }

    pub async fn check_llm_rpm(&self, user_id: &str, provider: &str) -> RateLimitResult {
        if !self.enabled {
            return self.allow_all(self.llm_rpm_capacity()).await;
        }
        let bucket = format!("{user_id}:{provider}");
        let capacity_override = self.provider_limits_for(provider).map(|p| p.rpm_capacity);
        self.llm_rpm.check(&bucket, 1, capacity_override, None).await
    }

    pub async fn check_llm_tpm(&self, user_id: &str, provider: &str, estimated_tokens: i64) -> RateLimitResult {
        if !self.enabled {
            return self.allow_all(self.llm_tpm_capacity()).await;
        }
        let bucket = format!("{user_id}:{provider}");
        let capacity_override = self.provider_limits_for(provider).map(|p| p.tpm_capacity);
        self.llm_tpm
            .check(&bucket, estimated_tokens, capacity_override, None)
            .await
    }

    fn api_capacity(&self) -> u64 {
        self.api.capacity()
    }
    fn auth_capacity(&self) -> u64 {
        self.auth.capacity()
    }
    fn llm_rpm_capacity(&self) -> u64 {
        self.llm_rpm.capacity()
    }
    fn llm_tpm_capacity(&self) -> u64 {
        self.llm_tpm.capacity()
    }
}
