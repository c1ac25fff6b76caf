//! Rate Limiter (C3, spec §4.4): a fixed-window limiter over the Cache
//! Backend, plus specialized API/auth/LLM-RPM/LLM-TPM limiters built on it.

pub mod limiter;
pub mod specialized;
pub mod stats;

pub use limiter::{FixedWindowRateLimiter, RateLimitConfig, RateLimitResult};
pub use specialized::{ProviderLimits, RateLimitService};
pub use stats::LimitsSnapshot;
