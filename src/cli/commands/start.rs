//! Start command implementation.

use crate::cli::init_tracing;
use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start an embedded cluster.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Override the node list (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub nodes: Option<Vec<String>>,

    /// Leave new shards initializing instead of starting them.
    #[arg(long)]
    pub no_auto_start: bool,
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(config_path: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = if config_path.exists() {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config from {:?}", config_path))?
    } else {
        tracing::debug!(path = ?config_path, "config file not found, using defaults");
        Config::default()
    };
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run the start command with the given config path.
pub async fn run_start_with_config(
    args: StartArgs,
    config_path: &Path,
    log_level: Option<String>,
) -> Result<()> {
    let overrides = ConfigOverrides {
        log_level,
        nodes: args.nodes,
        auto_start_shards: args.no_auto_start.then_some(false),
        ..ConfigOverrides::default()
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
