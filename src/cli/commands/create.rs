//! Create command implementation.

use crate::cli::commands::load_config;
use crate::cli::init_tracing;
use crate::core::config::ConfigOverrides;
use crate::core::runtime::Runtime;
use crate::metadata::data_stream::DataStream;
use crate::services::create_data_stream::CreateDataStreamOutcome;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Create data streams on an embedded cluster.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Data stream names.
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Create registered system data streams.
    #[arg(long)]
    pub system: bool,

    /// Commit timeout in milliseconds (0 waits without bound).
    #[arg(long)]
    pub commit_timeout_ms: Option<u64>,

    /// Readiness timeout in milliseconds (0 checks once).
    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    /// Output format (text, json).
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Result for one requested data stream.
#[derive(Debug, Serialize)]
struct CreateReport {
    name: String,
    acknowledged: bool,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_stream: Option<DataStream>,
}

/// Run the create command.
pub async fn run_create(args: CreateArgs, config_path: &Path, log_level: Option<String>) -> Result<()> {
    if args.format != "text" && args.format != "json" {
        anyhow::bail!("--format must be 'text' or 'json', got: {}", args.format);
    }

    let overrides = ConfigOverrides {
        log_level,
        ..ConfigOverrides::default()
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry.log_level);

    let commit_timeout = args
        .commit_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.commit_timeout());
    let ack_timeout = args
        .ack_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.ack_timeout());

    let mut runtime = Runtime::new(config)?;
    runtime.start().await?;

    let reports = create_all(&runtime, &args, commit_timeout, ack_timeout).await;
    runtime.stop().await?;
    let reports = reports?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&reports)?),
        _ => print_text(&reports),
    }

    if reports.iter().any(|r| r.error.is_some()) {
        anyhow::bail!("failed to create one or more data streams");
    }
    Ok(())
}

async fn create_all(
    runtime: &Runtime,
    args: &CreateArgs,
    commit_timeout: Duration,
    ack_timeout: Duration,
) -> Result<Vec<CreateReport>> {
    let service = runtime
        .data_streams()
        .context("data stream service is not running")?;

    let mut reports = Vec::with_capacity(args.names.len());
    for name in &args.names {
        let request = if args.system {
            service.system_request(name)
        } else {
            Ok(service.request(name.clone()))
        };
        let result = match request {
            Ok(request) => {
                service
                    .create_data_stream_detailed(
                        request
                            .commit_timeout(commit_timeout)
                            .ack_timeout(ack_timeout),
                    )
                    .await
            }
            Err(err) => Err(err),
        };

        let data_stream = runtime
            .state()
            .and_then(|state| state.metadata().data_stream(name).cloned());
        let report = match result {
            Ok(outcome) => CreateReport {
                name: name.clone(),
                acknowledged: outcome.is_acknowledged(),
                outcome: outcome_label(&outcome).to_string(),
                write_index: outcome.write_index().map(str::to_string),
                error: None,
                status: None,
                data_stream,
            },
            Err(err) => CreateReport {
                name: name.clone(),
                acknowledged: false,
                outcome: err.kind().to_string(),
                write_index: None,
                error: Some(err.to_string()),
                status: Some(err.status().code()),
                data_stream,
            },
        };
        reports.push(report);
    }
    Ok(reports)
}

fn outcome_label(outcome: &CreateDataStreamOutcome) -> &'static str {
    match outcome {
        CreateDataStreamOutcome::Acknowledged { .. } => "acknowledged",
        CreateDataStreamOutcome::ReadinessTimedOut { .. } => "readiness_timed_out",
        CreateDataStreamOutcome::NotCommitted { .. } => "not_committed",
    }
}

fn print_text(reports: &[CreateReport]) {
    for report in reports {
        match &report.error {
            Some(error) => {
                println!(
                    "✗ {} [{} {}]: {}",
                    report.name,
                    report.status.unwrap_or_default(),
                    report.outcome,
                    error
                );
            }
            None => {
                println!(
                    "✓ {} ({}, acknowledged={})",
                    report.name, report.outcome, report.acknowledged
                );
            }
        }
        if let Some(ds) = &report.data_stream {
            println!("    timestamp field: {}", ds.timestamp_field.name);
            println!("    generation:      {}", ds.generation);
            println!("    hidden:          {}", ds.is_hidden());
            println!("    system:          {}", ds.is_system());
            for index in &ds.indices {
                println!("    backing index:   {}", index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        let outcome = CreateDataStreamOutcome::ReadinessTimedOut {
            write_index: "w".to_string(),
        };
        assert_eq!(outcome_label(&outcome), "readiness_timed_out");
    }
}
