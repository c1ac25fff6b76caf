//! Application state and initialization

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use ragcore_core::config::AppConfig;
use ragcore_ingestion::stages::IngestionDeps;
use ragcore_ingestion::staging::FileStagingService;
use ragcore_ingestion::{TextChunker, WorkloadType};
use ragcore_infra::{build_cache, build_queue, Cache, Queue};
use ragcore_plugin_host::{KbCapability, PluginRegistry, SecretsCapability};
use ragcore_profiling::{ProfilingConfig, ProfilingOrchestrator, ProfilingService};
use ragcore_ratelimit::{FixedWindowRateLimiter, RateLimitConfig};
use ragcore_scheduler::{ExperienceSource, PluginFeedSource, SchedulerRuntime};
use ragcore_search::SearchService;
use ragcore_worker::{
    CapacityLimiter, DispatchTable, IngestionEmbedHandler, IngestionOcrHandler, ProfilingHandler,
    ShutdownSignal, WorkerRuntime,
};

use crate::cli::RunArgs;
use crate::collaborators::{DeterministicEmbedder, EchoLlmClient, PassthroughTextExtractor};
use crate::memory_store::{AllActiveUsers, AllowAllRbac, MemoryStore};
use crate::plugin_execution_handler::PluginExecutionHandler;

/// Shared application state: every long-lived `Arc` the worker loop(s) and
/// scheduler tick loop close over.
pub struct AppState {
    pub store: MemoryStore,
    pub queue: Arc<dyn Queue>,
    pub shutdown: ShutdownSignal,
    pub dispatch: DispatchTable,
    pub limiter: Arc<CapacityLimiter>,
    pub scheduler: SchedulerRuntime,
    pub queue_names: Vec<String>,
    pub poll_interval_seconds: u64,
}

impl AppState {
    pub async fn new(args: &RunArgs, config: AppConfig) -> Result<Self> {
        info!("initializing application components");

        let cache: Arc<dyn Cache> = Arc::from(build_cache(&config.cache).await.context("failed to build cache backend")?);
        let queue: Arc<dyn Queue> =
            Arc::from(build_queue(&config.queue).await.context("failed to build queue backend")?);
        let store = MemoryStore::new();

        let extractor = Arc::new(PassthroughTextExtractor);
        let embedder = Arc::new(DeterministicEmbedder::new(config.ingestion.embedding_dimension));
        let llm = Arc::new(EchoLlmClient);

        let staging = Arc::new(FileStagingService::new(cache.clone()));
        let _chunker = TextChunker::new(config.ingestion.chunk_size, config.ingestion.chunk_overlap);

        let ingestion_deps = Arc::new(IngestionDeps {
            queue: queue.clone(),
            staging: staging.clone(),
            documents: Arc::new(store.clone()),
            knowledge_bases: Arc::new(store.clone()),
            chunks: Arc::new(store.clone()),
            counters: Arc::new(store.clone()),
            extractor: extractor.clone(),
            embedder: embedder.clone(),
            enable_document_profiling: config.ingestion.enable_document_profiling,
        });

        let profiling_service = ProfilingService::new(
            llm,
            ProfilingConfig {
                model: "default-profiler".to_string(),
                timeout: Duration::from_secs(config.ingestion.ocr_page_timeout_seconds),
                chunk_profiling_batch_size: config.ingestion.chunk_profiling_batch_size,
                profiling_max_input_tokens: config.ingestion.profiling_max_input_tokens,
                profiling_full_doc_max_tokens: config.ingestion.profiling_full_doc_max_tokens,
            },
        );
        let profiling_orchestrator = Arc::new(ProfilingOrchestrator::new(store.clone(), profiling_service));

        let search =
            Arc::new(SearchService::new(Arc::new(store.clone()), Arc::new(store.clone()), Arc::new(store.clone())));

        let plugin_rate_limiter = Arc::new(FixedWindowRateLimiter::new(
            cache.clone(),
            RateLimitConfig::new("rl:plugin_execution", config.rate_limit.llm_rpm_default_capacity, 1.0),
        ));
        let secrets_rate_limiter = Arc::new(FixedWindowRateLimiter::new(
            cache.clone(),
            RateLimitConfig::new("rl:secrets", config.rate_limit.api_capacity, config.rate_limit.api_refill_per_second),
        ));
        let secrets = Arc::new(SecretsCapability::new(Arc::new(store.clone()), secrets_rate_limiter));

        let kb = Arc::new(KbCapability {
            documents: Arc::new(store.clone()),
            staging: staging.clone(),
            queue: queue.clone(),
            embedder: embedder.clone(),
            chunks: Arc::new(store.clone()),
            counters: Arc::new(store.clone()),
            search: search.clone(),
            rbac: Arc::new(AllowAllRbac),
            enable_document_profiling: config.ingestion.enable_document_profiling,
        });

        let registry = Arc::new(PluginRegistry::new());

        let mut dispatch = DispatchTable::new();
        dispatch.register(WorkloadType::IngestionOcr.queue_name(), Arc::new(IngestionOcrHandler::new(ingestion_deps.clone())));
        dispatch.register(WorkloadType::IngestionEmbed.queue_name(), Arc::new(IngestionEmbedHandler::new(ingestion_deps.clone())));
        dispatch.register(WorkloadType::Profiling.queue_name(), Arc::new(ProfilingHandler::new(profiling_orchestrator)));
        dispatch.register(
            WorkloadType::Ingestion.queue_name(),
            Arc::new(PluginExecutionHandler::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                registry,
                plugin_rate_limiter,
                secrets,
                kb,
                queue.clone(),
                "auto".to_string(),
            )),
        );

        let shutdown = ragcore_worker::install_shutdown_signal();

        let concurrency = args.concurrency.unwrap_or(config.worker.concurrency);
        let mut limits = HashMap::new();
        if concurrency > 0 {
            for workload in args.workload_types()? {
                limits.insert(workload, concurrency);
            }
        }
        let limiter = Arc::new(CapacityLimiter::new(limits));

        let plugin_feed_source = Arc::new(PluginFeedSource::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            queue.clone(),
            config.scheduler.plugins_scheduler_running_timeout_seconds,
        ));
        let experience_source = Arc::new(ExperienceSource::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(AllActiveUsers),
            queue.clone(),
        ));

        let scheduler = SchedulerRuntime::new(
            vec![plugin_feed_source, experience_source],
            Duration::from_secs(config.scheduler.tick_interval_seconds),
            config.scheduler.batch_size,
            config.scheduler.tick_history_capacity,
        );

        let queue_names = args.workload_types()?.into_iter().map(|w| w.queue_name()).collect();
        let poll_interval_seconds = config.worker.poll_interval_seconds;

        Ok(Self { store, queue, shutdown, dispatch, limiter, scheduler, queue_names, poll_interval_seconds })
    }
}

/// Main application
pub struct App {
    args: RunArgs,
    state: AppState,
}

impl App {
    pub async fn build(args: RunArgs) -> Result<Self> {
        let config = if let Some(path) = &args.config {
            ragcore_core::config::AppConfig::load_from_file(&path.to_string_lossy(), "RAGCORE")
                .context("failed to load configuration file")?
        } else {
            ragcore_core::config::AppConfig::load().context("failed to load configuration")?
        };

        let state = AppState::new(&args, config).await?;
        Ok(Self { args, state })
    }

    /// Runs the worker loop and scheduler tick loop until the shared
    /// shutdown signal fires.
    pub async fn run(self) -> Result<()> {
        info!(queues = ?self.state.queue_names, "starting worker runtime");

        let poll_interval = Duration::from_secs(self.args.poll_interval.unwrap_or(self.state.poll_interval_seconds));

        let scheduler_shutdown = self.state.shutdown.receiver();

        let worker = WorkerRuntime::new(
            self.state.queue_names,
            self.state.queue,
            self.state.limiter,
            self.state.dispatch,
            poll_interval,
            self.state.shutdown,
        );

        let scheduler = self.state.scheduler;

        tokio::join!(worker.run(), scheduler.run(scheduler_shutdown));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};
    use clap::Parser;

    fn run_args() -> RunArgs {
        match Args::parse_from(["ragcore-worker", "run"]).command {
            Command::Run(run_args) => run_args,
        }
    }

    #[tokio::test]
    async fn app_state_builds_with_default_config() {
        let args = run_args();
        let config = AppConfig::default();
        let result = AppState::new(&args, config).await;
        assert!(result.is_ok());
    }
}
