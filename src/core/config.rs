//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML with CLI overrides. Every section is
//! optional; an empty file yields a single-node cluster with no templates.

use crate::metadata::naming::validate_data_stream_name;
use crate::metadata::system::SystemDataStreamDescriptor;
use crate::metadata::template::ComposableTemplate;
use crate::services::create_index::IndexDefaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cluster identity and index defaults.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Shard allocation behaviour.
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Data stream creation defaults.
    #[serde(default)]
    pub data_streams: DataStreamsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Composable templates installed at start-up.
    #[serde(default)]
    pub templates: Vec<NamedTemplate>,

    /// Registered system data streams.
    #[serde(default)]
    pub system_data_streams: Vec<SystemDataStreamDescriptor>,
}

/// Cluster identity and index defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// Node ids, in allocation order.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    #[serde(default = "default_number_of_shards")]
    pub default_number_of_shards: u32,

    #[serde(default = "default_number_of_replicas")]
    pub default_number_of_replicas: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            nodes: default_nodes(),
            default_number_of_shards: default_number_of_shards(),
            default_number_of_replicas: default_number_of_replicas(),
        }
    }
}

/// Shard allocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Start initializing shards automatically.
    #[serde(default = "default_auto_start_shards")]
    pub auto_start_shards: bool,

    /// Delay before initializing shards are started.
    #[serde(default = "default_shard_start_delay_ms")]
    pub shard_start_delay_ms: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            auto_start_shards: default_auto_start_shards(),
            shard_start_delay_ms: default_shard_start_delay_ms(),
        }
    }
}

/// Data stream creation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStreamsConfig {
    /// Commit wait bound; 0 waits without bound.
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// Readiness wait bound; 0 checks once.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Data streams created at start-up.
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

impl Default for DataStreamsConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: default_commit_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            bootstrap: Vec::new(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// A template with the name it is registered under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTemplate {
    pub name: String,

    #[serde(flatten)]
    pub template: ComposableTemplate,
}

// Default value functions

fn default_cluster_name() -> String {
    "tributary".to_string()
}

fn default_nodes() -> Vec<String> {
    vec!["node-1".to_string()]
}

fn default_number_of_shards() -> u32 {
    1
}

fn default_number_of_replicas() -> u32 {
    1
}

fn default_auto_start_shards() -> bool {
    true
}

fn default_shard_start_delay_ms() -> u64 {
    50
}

fn default_commit_timeout_ms() -> u64 {
    30_000
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref cluster_name) = overrides.cluster_name {
            self.cluster.name = cluster_name.clone();
        }
        if let Some(ref nodes) = overrides.nodes {
            self.cluster.nodes = nodes.clone();
        }
        if let Some(auto_start) = overrides.auto_start_shards {
            self.allocation.auto_start_shards = auto_start;
        }
    }

    /// Index defaults for the index creation service.
    pub fn index_defaults(&self) -> IndexDefaults {
        IndexDefaults {
            number_of_shards: self.cluster.default_number_of_shards,
            number_of_replicas: self.cluster.default_number_of_replicas,
        }
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.data_streams.commit_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.data_streams.ack_timeout_ms)
    }

    pub fn shard_start_delay(&self) -> Duration {
        Duration::from_millis(self.allocation.shard_start_delay_ms)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_cluster()?;
        self.validate_telemetry()?;
        self.validate_templates()?;
        self.validate_data_streams()?;
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        if self.cluster.name.trim().is_empty() {
            anyhow::bail!("cluster.name must not be empty");
        }
        if self.cluster.nodes.is_empty() {
            anyhow::bail!("cluster.nodes must list at least one node");
        }
        let mut seen = BTreeSet::new();
        for node in &self.cluster.nodes {
            if node.trim().is_empty() {
                anyhow::bail!("cluster.nodes must not contain empty node ids");
            }
            if !seen.insert(node.as_str()) {
                anyhow::bail!("cluster.nodes contains duplicate node id: {}", node);
            }
        }
        if self.cluster.default_number_of_shards == 0 {
            anyhow::bail!("cluster.default_number_of_shards must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    fn validate_templates(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for named in &self.templates {
            if named.name.trim().is_empty() {
                anyhow::bail!("templates.name must not be empty");
            }
            if !names.insert(named.name.as_str()) {
                anyhow::bail!("duplicate template name: {}", named.name);
            }
            if named.template.index_patterns.is_empty() {
                anyhow::bail!("template [{}] must have at least one index pattern", named.name);
            }
        }
        Ok(())
    }

    fn validate_data_streams(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for descriptor in &self.system_data_streams {
            validate_data_stream_name(&descriptor.name)
                .with_context(|| "invalid system data stream name")?;
            if !names.insert(descriptor.name.as_str()) {
                anyhow::bail!("duplicate system data stream: {}", descriptor.name);
            }
            if descriptor.template.data_stream.is_none() {
                anyhow::bail!(
                    "system data stream [{}] template must have a data_stream section",
                    descriptor.name
                );
            }
        }
        for name in &self.data_streams.bootstrap {
            validate_data_stream_name(name)
                .with_context(|| "invalid bootstrap data stream name")?;
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override cluster name.
    pub cluster_name: Option<String>,
    /// Override node list.
    pub nodes: Option<Vec<String>>,
    /// Override automatic shard start.
    pub auto_start_shards: Option<bool>,
}
