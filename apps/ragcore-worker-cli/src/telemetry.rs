//! Telemetry initialization (logging and tracing)

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::RunArgs;

/// Guards that must be kept alive for the duration of the program
pub struct TelemetryGuards;

/// Initializes the global `tracing` subscriber: an `EnvFilter` sourced from
/// `RUST_LOG`/`--log-level`, switching between pretty (dev) and JSON (prod)
/// formatting layers on `--json-logs`.
pub fn init_telemetry(args: &RunArgs) -> Result<TelemetryGuards> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("failed to build tracing env filter")?;

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true).with_line_number(true).with_file(true))
            .init();
    }

    Ok(TelemetryGuards)
}
