//! `secrets.get` / `secrets.set` (spec §4.10): two scopes, `system`
//! (admin-managed) and `user` (per-user); `get` prefers user scope and
//! falls back to system. Calls are themselves rate-limited per plugin
//! (SPEC_FULL §6.6, `backend/src/shu/plugins/rate_limit.py`) using the same
//! `ragcore-ratelimit` primitive the provider RPM/TPM limiters use, so a
//! runaway feed can't hammer the secrets store.

use std::sync::Arc;

use async_trait::async_trait;
use ragcore_core::ids::UserId;
use ragcore_ratelimit::FixedWindowRateLimiter;

use crate::context::PluginContext;
use crate::error::{CapabilityError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    System,
    User,
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret store operation failed: {0}")]
    Operation(String),
}

/// Local, dyn-safe collaborator seam — backed by whatever persistence the
/// deployment chooses (spec §1 treats the store itself as out of scope).
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, scope: Scope, owner: &str, key: &str) -> std::result::Result<Option<String>, SecretStoreError>;
    async fn set(&self, scope: Scope, owner: &str, key: &str, value: &str) -> std::result::Result<(), SecretStoreError>;
}

pub struct SecretsCapability {
    store: Arc<dyn SecretStore>,
    limiter: Arc<FixedWindowRateLimiter>,
}

impl SecretsCapability {
    pub fn new(store: Arc<dyn SecretStore>, limiter: Arc<FixedWindowRateLimiter>) -> Self {
        Self { store, limiter }
    }

    async fn check_rate_limit(&self, ctx: &PluginContext) -> Result<()> {
        let result = self.limiter.check(ctx.plugin_name(), 1, None, None).await;
        if !result.allowed {
            return Err(CapabilityError::rate_limited(format!(
                "secrets access rate limited, retry after {}s",
                result.retry_after_seconds
            )));
        }
        Ok(())
    }

    /// Prefers the per-user secret, falling back to the system-scoped one.
    pub async fn get(&self, ctx: &PluginContext, key: &str) -> Result<Option<String>> {
        self.check_rate_limit(ctx).await?;
        if let Some(value) = self
            .store
            .get(Scope::User, ctx.user_id().as_str(), key)
            .await
            .map_err(store_error)?
        {
            return Ok(Some(value));
        }
        self.store.get(Scope::System, system_owner(), key).await.map_err(store_error)
    }

    pub async fn set(&self, ctx: &PluginContext, scope: Scope, key: &str, value: &str) -> Result<()> {
        self.check_rate_limit(ctx).await?;
        let owner = match scope {
            Scope::System => system_owner().to_string(),
            Scope::User => ctx.user_id().as_str().to_string(),
        };
        self.store.set(scope, &owner, key, value).await.map_err(store_error)
    }
}

fn system_owner() -> &'static str {
    "system"
}

fn store_error(e: SecretStoreError) -> CapabilityError {
    CapabilityError { code: "store_error".to_string(), message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ragcore_infra::{Cache, MemoryCache};
    use ragcore_ratelimit::RateLimitConfig;
    use std::collections::HashMap;

    struct FakeStore {
        system: Mutex<HashMap<String, String>>,
        user: Mutex<HashMap<(String, String), String>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self { system: Mutex::new(HashMap::new()), user: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl SecretStore for FakeStore {
        async fn get(&self, scope: Scope, owner: &str, key: &str) -> std::result::Result<Option<String>, SecretStoreError> {
            Ok(match scope {
                Scope::System => self.system.lock().get(key).cloned(),
                Scope::User => self.user.lock().get(&(owner.to_string(), key.to_string())).cloned(),
            })
        }
        async fn set(&self, scope: Scope, owner: &str, key: &str, value: &str) -> std::result::Result<(), SecretStoreError> {
            match scope {
                Scope::System => {
                    self.system.lock().insert(key.to_string(), value.to_string());
                }
                Scope::User => {
                    self.user.lock().insert((owner.to_string(), key.to_string()), value.to_string());
                }
            }
            Ok(())
        }
    }

    fn ctx() -> PluginContext {
        PluginContext::new("plugin1", UserId::from("u1"), None, vec![], "auto")
    }

    fn capability() -> SecretsCapability {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(60));
        let limiter = Arc::new(FixedWindowRateLimiter::new(cache, RateLimitConfig::new("rl:secrets", 1000, 1000.0 / 60.0)));
        SecretsCapability::new(Arc::new(FakeStore::new()), limiter)
    }

    #[tokio::test]
    async fn user_scope_is_preferred_over_system() {
        let capability = capability();
        let context = ctx();
        capability.set(&context, Scope::System, "k", "system-value").await.unwrap();
        capability.set(&context, Scope::User, "k", "user-value").await.unwrap();
        assert_eq!(capability.get(&context, "k").await.unwrap(), Some("user-value".to_string()));
    }

    #[tokio::test]
    async fn falls_back_to_system_when_user_scope_absent() {
        let capability = capability();
        let context = ctx();
        capability.set(&context, Scope::System, "k", "system-value").await.unwrap();
        assert_eq!(capability.get(&context, "k").await.unwrap(), Some("system-value".to_string()));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let capability = capability();
        assert_eq!(capability.get(&ctx(), "missing").await.unwrap(), None);
    }
}
