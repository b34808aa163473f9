//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/tributary.toml")]
        config: PathBuf,
    },
    /// Print configuration with defaults.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/tributary.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config),
        ConfigCommand::Show { config, format } => show_config(&config, &format),
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let config = Config::from_file(path)?;
    println!("✓ Config file is valid");
    println!(
        "  cluster {} with {} node(s), {} template(s), {} system data stream(s)",
        config.cluster.name,
        config.cluster.nodes.len(),
        config.templates.len(),
        config.system_data_streams.len()
    );
    if config.templates.iter().all(|t| t.template.data_stream.is_none()) {
        println!("  ⚠ Warning: no template can create data streams");
    }
    if !config.allocation.auto_start_shards {
        println!("  ⚠ Warning: shards are never started; creations will not be acknowledged");
    }
    Ok(())
}

fn show_config(path: &Path, format: &str) -> Result<()> {
    let config = if path.exists() {
        Config::from_file(path)?
    } else {
        Config::default()
    };

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let rendered =
                toml::to_string_pretty(&config).context("failed to render config as TOML")?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = generate_template();

    match output {
        Some(path) => {
            std::fs::write(path, &template)?;
            println!("Generated config template: {:?}", path);
        }
        None => {
            println!("{}", template);
        }
    }

    Ok(())
}

fn generate_template() -> String {
    r#"# Tributary Configuration

[cluster]
name = "tributary"
nodes = ["node-1", "node-2"]
default_number_of_shards = 1
default_number_of_replicas = 1

[allocation]
auto_start_shards = true
shard_start_delay_ms = 50

[data_streams]
commit_timeout_ms = 30000
ack_timeout_ms = 30000
bootstrap = []

[telemetry]
log_level = "info"

[[templates]]
name = "logs"
index_patterns = ["logs-*"]
priority = 100

[templates.data_stream]
timestamp_field = "@timestamp"
"#
    .to_string()
}
