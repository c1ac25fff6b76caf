//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ragcore-worker",
    about = "RAGCore background worker and scheduler",
    version,
    long_about = "Polls the ingestion/profiling/plugin-execution queues and runs the \
                  unified scheduler tick loop for a RAGCore deployment."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll the configured queues and run the scheduler tick loop until shutdown
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Comma-separated workload types to poll (INGESTION, INGESTION_OCR,
    /// INGESTION_EMBED, LLM_WORKFLOW, MAINTENANCE, PROFILING). Defaults to all six.
    #[arg(long, env = "WORKLOAD_TYPES", value_delimiter = ',')]
    pub workload_types: Vec<String>,

    /// Seconds between empty-queue polls
    #[arg(long, env = "POLL_INTERVAL_SECONDS")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for an in-flight job to finish on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECONDS")]
    pub shutdown_timeout: Option<u64>,

    /// Number of jobs this process may run concurrently per workload type
    #[arg(long, env = "WORKER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Path to configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Enable JSON log format (useful for production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl RunArgs {
    /// Parses `--workload-types` into the enum, defaulting to every workload
    /// type when the flag is omitted.
    pub fn workload_types(&self) -> anyhow::Result<Vec<ragcore_ingestion::WorkloadType>> {
        if self.workload_types.is_empty() {
            return Ok(vec![
                ragcore_ingestion::WorkloadType::Ingestion,
                ragcore_ingestion::WorkloadType::IngestionOcr,
                ragcore_ingestion::WorkloadType::IngestionEmbed,
                ragcore_ingestion::WorkloadType::LlmWorkflow,
                ragcore_ingestion::WorkloadType::Maintenance,
                ragcore_ingestion::WorkloadType::Profiling,
            ]);
        }
        self.workload_types.iter().map(|name| parse_workload_type(name)).collect()
    }
}

fn parse_workload_type(name: &str) -> anyhow::Result<ragcore_ingestion::WorkloadType> {
    use ragcore_ingestion::WorkloadType::*;
    match name.trim().to_uppercase().as_str() {
        "INGESTION" => Ok(Ingestion),
        "INGESTION_OCR" => Ok(IngestionOcr),
        "INGESTION_EMBED" => Ok(IngestionEmbed),
        "LLM_WORKFLOW" => Ok(LlmWorkflow),
        "MAINTENANCE" => Ok(Maintenance),
        "PROFILING" => Ok(Profiling),
        other => Err(anyhow::anyhow!("unknown workload type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert()
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["ragcore-worker", "run"];
        argv.extend_from_slice(extra);
        match Args::parse_from(argv).command {
            Command::Run(run_args) => run_args,
        }
    }

    #[test]
    fn defaults_to_every_workload_type_when_unset() {
        assert_eq!(run_args(&[]).workload_types().unwrap().len(), 6);
    }

    #[test]
    fn parses_explicit_workload_types() {
        let args = run_args(&["--workload-types", "ingestion_ocr,profiling"]);
        assert_eq!(
            args.workload_types().unwrap(),
            vec![ragcore_ingestion::WorkloadType::IngestionOcr, ragcore_ingestion::WorkloadType::Profiling]
        );
    }

    #[test]
    fn rejects_unknown_workload_type() {
        let args = run_args(&["--workload-types", "bogus"]);
        assert!(args.workload_types().is_err());
    }
}
