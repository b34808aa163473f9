//! Command-line interface.
//!
//! Unified CLI for running and exercising an embedded cluster.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tributary - data stream creation over versioned cluster metadata.
#[derive(Parser, Debug)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an embedded cluster and run until interrupted.
    Start(commands::StartArgs),
    /// Create data streams on an embedded cluster and print the result.
    Create(commands::CreateArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over `default_level`.
#[cfg(feature = "telemetry")]
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_default_level: &str) {}
