//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tributary::cluster::allocation::AllocationService;
use tributary::cluster::publication::{LocalPublisher, PublishOutcome, Publisher};
use tributary::cluster::task_queue::ClusterStateTaskQueue;
use tributary::core::config::Config;
use tributary::core::error::StreamResult;
use tributary::core::time::ManualClock;
use tributary::metadata::state::ClusterState;
use tributary::metadata::system::{SystemDataStreamDescriptor, SystemDataStreams};
use tributary::metadata::template::{AliasDefinition, ComposableTemplate, MetadataTemplateResolver, TemplateBody};
use tributary::ops::observability::StreamMetrics;
use tributary::services::active_shards::{
    ActiveShardCount, ActiveShardsObserver, ClusterActiveShardsObserver, ReadinessFuture,
    ShardsReadiness,
};
use tributary::services::create_data_stream::{CreateDataStreamService, TransitionContext};
use tributary::services::create_index::{IndexCreationService, IndexDefaults, MetadataCreateIndexService};

/// 2024-03-05T00:00:00Z.
pub const START_TIME: u64 = 1_709_596_800_000;

/// Date part of backing index names created at [`START_TIME`].
pub const START_DATE: &str = "2024.03.05";

/// Create a config file with the given content.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a minimal valid configuration file with a `logs-*` template.
pub fn create_minimal_config() -> NamedTempFile {
    create_config(
        r#"
[cluster]
name = "test"
nodes = ["node-1"]

[[templates]]
name = "logs"
index_patterns = ["logs-*"]
priority = 100

[templates.data_stream]
timestamp_field = "@timestamp"
"#,
    )
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Template creating data streams for `logs-*`.
pub fn logs_template() -> ComposableTemplate {
    let mut template = ComposableTemplate::for_data_streams(&["logs-*"], "@timestamp");
    template.priority = 100;
    template
}

/// `logs-*` template that attaches the given aliases.
pub fn logs_template_with_aliases(aliases: &[(&str, Option<bool>, Option<&str>)]) -> ComposableTemplate {
    let mut template = logs_template();
    template.template = Some(TemplateBody {
        aliases: aliases
            .iter()
            .map(|(name, is_write, filter)| {
                (
                    name.to_string(),
                    AliasDefinition {
                        filter: filter.map(str::to_string),
                        is_write_index: *is_write,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
        ..TemplateBody::default()
    });
    template
}

/// Descriptor for a system data stream named `name`.
pub fn system_descriptor(name: &str) -> SystemDataStreamDescriptor {
    SystemDataStreamDescriptor::new(
        name,
        "test system data stream",
        ComposableTemplate::for_data_streams(&[name], "@timestamp"),
    )
}

/// Cluster state with `node_count` nodes and the given templates installed.
pub fn cluster_state(node_count: usize, templates: &[(&str, ComposableTemplate)]) -> ClusterState {
    let state = ClusterState::new(
        "test",
        (1..=node_count).map(|i| format!("node-{i}")).collect(),
    );
    let mut metadata = state.metadata().builder();
    for (name, template) in templates {
        metadata = metadata.put_template(*name, template.clone());
    }
    state
        .builder()
        .metadata(metadata.build().expect("valid metadata"))
        .build()
}

/// Transition context backed by the in-memory services.
pub fn in_memory_context(system: Vec<SystemDataStreamDescriptor>) -> TransitionContext {
    context_with_index_service(Arc::new(MetadataCreateIndexService::new(IndexDefaults::default())), system)
}

/// Transition context with a custom index creation service.
pub fn context_with_index_service(
    index_service: Arc<dyn IndexCreationService>,
    system: Vec<SystemDataStreamDescriptor>,
) -> TransitionContext {
    TransitionContext::new(
        index_service,
        Arc::new(MetadataTemplateResolver),
        Arc::new(SystemDataStreams::new(system)),
    )
}

/// Publisher whose commit decision can be flipped by the test.
#[derive(Debug)]
pub struct SwitchPublisher {
    commit: AtomicBool,
}

impl SwitchPublisher {
    pub fn new(commit: bool) -> Self {
        Self {
            commit: AtomicBool::new(commit),
        }
    }

    pub fn set_commit(&self, commit: bool) {
        self.commit.store(commit, Ordering::SeqCst);
    }
}

impl Publisher for SwitchPublisher {
    fn publish(&self, _previous: &ClusterState, _next: &ClusterState) -> PublishOutcome {
        if self.commit.load(Ordering::SeqCst) {
            PublishOutcome::Committed
        } else {
            PublishOutcome::NotCommitted
        }
    }
}

/// Observer that always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedObserver(pub ShardsReadiness);

impl ActiveShardsObserver for FixedObserver {
    fn wait_for_active_shards(
        &self,
        _indices: Vec<String>,
        _count: ActiveShardCount,
        _timeout: Duration,
    ) -> ReadinessFuture<'_> {
        let readiness = self.0;
        Box::pin(async move { readiness })
    }
}

/// A running queue plus the data stream service on top of it.
pub struct Harness {
    pub queue: ClusterStateTaskQueue,
    pub service: CreateDataStreamService,
    pub metrics: Arc<StreamMetrics>,
    pub worker: JoinHandle<()>,
    pub allocation: Option<JoinHandle<StreamResult<()>>>,
    pub shutdown: tokio::sync::watch::Sender<bool>,
}

/// Options for building a [`Harness`].
pub struct HarnessOptions {
    pub nodes: usize,
    pub templates: Vec<(&'static str, ComposableTemplate)>,
    pub system: Vec<SystemDataStreamDescriptor>,
    pub publisher: Arc<dyn Publisher>,
    /// `None` uses the cluster observer.
    pub observer: Option<Arc<dyn ActiveShardsObserver>>,
    /// Start shards automatically after this delay.
    pub auto_start: Option<Duration>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            nodes: 1,
            templates: vec![("logs", logs_template())],
            system: Vec::new(),
            publisher: Arc::new(LocalPublisher),
            observer: None,
            auto_start: Some(Duration::from_millis(10)),
        }
    }
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        let templates: Vec<(&str, ComposableTemplate)> = options
            .templates
            .iter()
            .map(|(name, template)| (*name, template.clone()))
            .collect();
        let metrics = Arc::new(StreamMetrics::new());
        let (queue, worker) = ClusterStateTaskQueue::start(
            cluster_state(options.nodes, &templates),
            options.publisher,
            metrics.clone(),
        );

        let (shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
        let allocation = options.auto_start.map(|delay| {
            tokio::spawn(AllocationService::new(queue.clone(), delay).run(shutdown_rx))
        });

        let observer = options
            .observer
            .unwrap_or_else(|| Arc::new(ClusterActiveShardsObserver::new(queue.subscribe())));
        let service = CreateDataStreamService::new(
            queue.clone(),
            in_memory_context(options.system),
            observer,
            Arc::new(ManualClock::new(START_TIME)),
            metrics.clone(),
        );

        Self {
            queue,
            service,
            metrics,
            worker,
            allocation,
            shutdown,
        }
    }

    /// Harness with default options.
    pub fn start() -> Self {
        Self::new(HarnessOptions::default())
    }

    pub fn version(&self) -> u64 {
        self.queue.state().version()
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Some(allocation) = self.allocation {
            let _ = allocation.await;
        }
        self.queue.shutdown();
        let _ = self.worker.await;
    }
}

/// Name of the first backing index of `data_stream` created at [`START_TIME`].
pub fn first_backing_index(data_stream: &str) -> String {
    format!(".ds-{data_stream}-{START_DATE}-000001")
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_minimal_config() {
        let file = create_minimal_config();
        let config = load_config(&file);
        assert_eq!(config.cluster.name, "test");
        assert_eq!(config.templates.len(), 1);
    }

    #[test]
    fn test_first_backing_index() {
        assert_eq!(first_backing_index("logs-app"), ".ds-logs-app-2024.03.05-000001");
    }

    #[test]
    fn test_cluster_state_installs_templates() {
        let state = cluster_state(2, &[("logs", logs_template())]);
        assert_eq!(state.nodes().len(), 2);
        assert!(state.metadata().template("logs").is_some());
        assert_eq!(state.version(), 0);
    }
}
