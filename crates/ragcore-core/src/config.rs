//! Environment-driven configuration (spec §6 "Environment-driven config"),
//! loaded the way `copilot_core::config::AppConfig` does: a `config::Config`
//! builder layering defaults, an optional file, and environment variables
//! under a `RAGCORE__` prefix with `__` as the nesting separator.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When set, the shared (distributed) cache backend is used; otherwise local (spec §4.1).
    pub shared_url: Option<String>,
    pub local_sweep_interval_seconds: u64,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared_url: None,
            local_sweep_interval_seconds: 60,
            key_prefix: "ragcore:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// When set, the shared (distributed) queue backend is used; otherwise local (spec §4.2).
    pub shared_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { shared_url: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub api_capacity: u64,
    pub api_refill_per_second: f64,
    pub auth_capacity: u64,
    pub auth_refill_per_second: f64,
    pub llm_rpm_default_capacity: u64,
    pub llm_tpm_default_capacity: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_capacity: 60,
            api_refill_per_second: 1.0,
            auth_capacity: 10,
            auth_refill_per_second: 10.0 / 60.0,
            llm_rpm_default_capacity: 60,
            llm_tpm_default_capacity: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,
    pub ocr_max_concurrent_jobs: usize,
    pub ocr_page_timeout_seconds: u64,
    pub enable_document_profiling: bool,
    pub profiling_max_concurrent_tasks: usize,
    pub chunk_profiling_batch_size: usize,
    pub profiling_max_input_tokens: usize,
    pub profiling_full_doc_max_tokens: usize,
    pub file_staging_ttl_seconds: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            embedding_dimension: 384,
            embedding_model: "default-embedder".to_string(),
            ocr_max_concurrent_jobs: 1,
            ocr_page_timeout_seconds: 180,
            enable_document_profiling: true,
            profiling_max_concurrent_tasks: 4,
            chunk_profiling_batch_size: 10,
            profiling_max_input_tokens: 8_000,
            profiling_full_doc_max_tokens: 4_000,
            file_staging_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub poll_interval_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1,
            shutdown_timeout_seconds: 30,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
    pub batch_size: usize,
    pub plugins_scheduler_running_timeout_seconds: i64,
    pub experience_run_visibility_timeout_seconds: u64,
    pub tick_history_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            batch_size: 100,
            plugins_scheduler_running_timeout_seconds: 600,
            experience_run_visibility_timeout_seconds: 600,
            tick_history_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub ingestion: IngestionConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Loads configuration from environment variables (prefix `RAGCORE`,
    /// `__` as the nesting separator), falling back to the defaults above.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("RAGCORE")
    }

    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        builder.build()?.try_deserialize()
    }

    /// Loads from a TOML file overlaid with environment variables, mirroring
    /// `AppConfig::load_from_file` in the teacher's `copilot_core::config`.
    pub fn load_from_file(path: &str, prefix: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_knowledge_base_invariant() {
        let cfg = IngestionConfig::default();
        assert!(cfg.chunk_overlap < cfg.chunk_size);
    }

    #[test]
    fn default_embedding_dimension_is_384() {
        assert_eq!(IngestionConfig::default().embedding_dimension, 384);
    }

    #[test]
    fn load_without_env_vars_returns_defaults() {
        let cfg = AppConfig::load_from_env("RAGCORE_TEST_UNSET_PREFIX_XYZ").unwrap();
        assert_eq!(cfg.scheduler.tick_interval_seconds, 60);
        assert_eq!(cfg.worker.concurrency, 1);
    }
}
