mod app;
mod cli;
mod collaborators;
mod memory_store;
mod plugin_execution_handler;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::app::App;
use crate::cli::{Args, Command, RunArgs};
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();
    let Command::Run(run_args) = args.command;

    // Initialize telemetry (logging, tracing)
    let _guards = init_telemetry(&run_args)?;

    info!("starting ragcore worker");
    info!(version = env!("CARGO_PKG_VERSION"));

    let result = run_application(run_args).await;

    if let Err(ref e) = result {
        error!("application error: {:#}", e);
    }

    info!("worker shutdown complete");

    result
}

async fn run_application(args: RunArgs) -> Result<()> {
    let app = App::build(args).await?;
    app.run().await?;
    Ok(())
}
