//! Tributary - unified CLI entrypoint.
//!
//! Usage:
//!   tributary start --config config/tributary.toml
//!   tributary create logs-app --ack-timeout-ms 5000
//!   tributary create .fleet-actions-results --system --format json
//!   tributary config validate --config config/tributary.toml

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tributary::cli::commands::{run_config, run_create, run_start_with_config};
use tributary::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/tributary.toml"));

    match cli.command {
        Commands::Start(args) => run_start_with_config(args, &config_path, cli.log_level).await,
        Commands::Create(args) => run_create(args, &config_path, cli.log_level).await,
        Commands::Config(args) => run_config(args),
    }
}
