//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: task queue → shard allocation → data stream service (and bootstrap data streams)
//! - Shutdown order: data stream service → shard allocation → task queue

use crate::cluster::allocation::AllocationService;
use crate::cluster::publication::{LocalPublisher, Publisher};
use crate::cluster::task_queue::ClusterStateTaskQueue;
use crate::core::config::Config;
use crate::core::error::StreamResult;
use crate::core::time::{Clock, SystemClock};
use crate::metadata::state::ClusterState;
use crate::metadata::system::SystemDataStreams;
use crate::metadata::template::MetadataTemplateResolver;
use crate::ops::observability::{HealthStatus, StreamMetrics};
use crate::services::active_shards::ClusterActiveShardsObserver;
use crate::services::create_data_stream::{
    CreateDataStreamOutcome, CreateDataStreamService, TransitionContext,
};
use crate::services::create_index::MetadataCreateIndexService;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `stop` waits for a background task to finish.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Cluster state task queue.
    pub task_queue: ComponentHealth,
    /// Shard allocation loop.
    pub allocation: ComponentHealth,
    /// Data stream creation service.
    pub data_streams: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            task_queue: ComponentHealth::Starting,
            allocation: ComponentHealth::Starting,
            data_streams: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.task_queue, self.allocation, self.data_streams),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy | ComponentHealth::Degraded,
                ComponentHealth::Healthy
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        !matches!(
            (self.task_queue, self.data_streams),
            (ComponentHealth::Failed, _) | (_, ComponentHealth::Failed)
        )
    }
}

/// Runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    metrics: Arc<StreamMetrics>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,

    queue: Option<ClusterStateTaskQueue>,
    queue_worker: Option<JoinHandle<()>>,
    allocation_handle: Option<JoinHandle<StreamResult<()>>>,
    data_streams: Option<CreateDataStreamService>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            metrics: Arc::new(StreamMetrics::new()),
            publisher: Arc::new(LocalPublisher),
            clock: Arc::new(SystemClock),
            queue: None,
            queue_worker: None,
            allocation_handle: None,
            data_streams: None,
        })
    }

    /// Replace the publisher. Takes effect on the next `start`.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Replace the clock used to stamp creation requests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// The task queue (if started).
    pub fn queue(&self) -> Option<&ClusterStateTaskQueue> {
        self.queue.as_ref()
    }

    /// The data stream service (if started).
    pub fn data_streams(&self) -> Option<&CreateDataStreamService> {
        self.data_streams.as_ref()
    }

    /// The latest installed cluster state (if started).
    pub fn state(&self) -> Option<Arc<ClusterState>> {
        self.queue.as_ref().map(ClusterStateTaskQueue::state)
    }

    /// Overall health from queue liveness and shard activity.
    pub fn health_status(&self) -> HealthStatus {
        match &self.queue {
            Some(queue) => {
                let state = queue.state();
                let routing = state.routing_table();
                HealthStatus::evaluate(
                    queue.is_running(),
                    routing.has_initializing() || routing.has_unassigned(),
                )
            }
            None => HealthStatus::Unhealthy,
        }
    }

    /// Initialize and start all runtime components.
    ///
    /// Components are started in order:
    /// 1. Cluster state task queue (with configured templates installed)
    /// 2. Shard allocation loop
    /// 3. Data stream service, then bootstrap data streams
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            cluster = %self.config.cluster.name,
            nodes = ?self.config.cluster.nodes,
            "starting runtime"
        );

        // 1. Initialize task queue
        self.init_task_queue()?;

        // 2. Initialize shard allocation
        self.init_allocation();

        // 3. Initialize data stream service
        self.init_data_streams().await?;

        self.running.store(true, Ordering::Release);
        tracing::info!("runtime started");

        Ok(())
    }

    /// Build the initial state and start the queue worker.
    fn init_task_queue(&mut self) -> Result<()> {
        tracing::debug!("initializing cluster state task queue");

        let initial = ClusterState::new(
            self.config.cluster.name.clone(),
            self.config.cluster.nodes.clone(),
        );
        let mut metadata = initial.metadata().builder();
        for named in &self.config.templates {
            metadata = metadata.put_template(named.name.clone(), named.template.clone());
        }
        let metadata = metadata
            .build()
            .context("failed to build initial cluster metadata")?;
        let initial = initial.builder().metadata(metadata).build();

        let (queue, worker) =
            ClusterStateTaskQueue::start(initial, self.publisher.clone(), self.metrics.clone());
        self.queue = Some(queue);
        self.queue_worker = Some(worker);
        self.health.task_queue = ComponentHealth::Healthy;

        tracing::info!(
            templates = self.config.templates.len(),
            "cluster state task queue initialized"
        );
        Ok(())
    }

    /// Spawn the allocation loop when automatic shard start is enabled.
    fn init_allocation(&mut self) {
        let Some(queue) = self.queue.clone() else {
            self.health.allocation = ComponentHealth::Failed;
            return;
        };
        if !self.config.allocation.auto_start_shards {
            self.health.allocation = ComponentHealth::Degraded;
            tracing::info!("automatic shard start disabled");
            return;
        }

        let service = AllocationService::new(queue, self.config.shard_start_delay());
        let shutdown_rx = self.shutdown_rx.clone();
        self.allocation_handle = Some(tokio::spawn(service.run(shutdown_rx)));
        self.health.allocation = ComponentHealth::Healthy;
        tracing::info!("shard allocation initialized");
    }

    /// Build the data stream service and create bootstrap data streams.
    async fn init_data_streams(&mut self) -> Result<()> {
        tracing::debug!("initializing data stream service");

        let queue = self
            .queue
            .clone()
            .context("task queue must start before the data stream service")?;
        let context = TransitionContext::new(
            Arc::new(MetadataCreateIndexService::new(self.config.index_defaults())),
            Arc::new(MetadataTemplateResolver),
            Arc::new(SystemDataStreams::new(
                self.config.system_data_streams.iter().cloned(),
            )),
        );
        let observer = Arc::new(ClusterActiveShardsObserver::new(queue.subscribe()));
        let service = CreateDataStreamService::new(
            queue,
            context,
            observer,
            self.clock.clone(),
            self.metrics.clone(),
        );

        for name in &self.config.data_streams.bootstrap {
            let request = service
                .request(name.clone())
                .commit_timeout(self.config.commit_timeout())
                .ack_timeout(self.config.ack_timeout());
            match service.create_data_stream_detailed(request).await {
                Ok(CreateDataStreamOutcome::Acknowledged { write_index }) => {
                    tracing::info!(data_stream = %name, write_index = %write_index, "bootstrap data stream created");
                }
                Ok(outcome) => {
                    tracing::warn!(data_stream = %name, outcome = ?outcome, "bootstrap data stream not acknowledged");
                }
                Err(err) => {
                    self.health.data_streams = ComponentHealth::Failed;
                    return Err(err)
                        .with_context(|| format!("failed to bootstrap data stream [{name}]"));
                }
            }
        }

        self.data_streams = Some(service);
        self.health.data_streams = ComponentHealth::Healthy;
        tracing::info!(
            system_data_streams = self.config.system_data_streams.len(),
            bootstrapped = self.config.data_streams.bootstrap.len(),
            "data stream service initialized"
        );
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&mut self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run the runtime until ctrl-c or a shutdown request.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping runtime");
        self.running.store(false, Ordering::Release);

        // Signal shutdown to all components
        let _ = self.shutdown_tx.send(true);

        // 1. Stop data stream service
        self.health.data_streams = ComponentHealth::Stopping;
        self.data_streams = None;
        self.health.data_streams = ComponentHealth::Stopped;

        // 2. Stop shard allocation
        self.stop_allocation().await;

        // 3. Stop task queue
        self.stop_task_queue().await;

        tracing::info!("runtime stopped");
        Ok(())
    }

    async fn stop_allocation(&mut self) {
        tracing::debug!("stopping shard allocation");
        self.health.allocation = ComponentHealth::Stopping;

        if let Some(handle) = self.allocation_handle.take() {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "shard allocation stopped with error");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "shard allocation task panicked");
                }
                Err(_) => {
                    tracing::warn!("shard allocation stop timed out");
                }
            }
        }

        self.health.allocation = ComponentHealth::Stopped;
    }

    async fn stop_task_queue(&mut self) {
        tracing::debug!("stopping cluster state task queue");
        self.health.task_queue = ComponentHealth::Stopping;

        if let Some(queue) = &self.queue {
            queue.shutdown();
        }
        if let Some(worker) = self.queue_worker.take() {
            match tokio::time::timeout(STOP_TIMEOUT, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "task queue worker panicked");
                }
                Err(_) => {
                    tracing::warn!("task queue stop timed out");
                }
            }
        }

        self.health.task_queue = ComponentHealth::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_readiness() {
        let mut health = RuntimeHealth::default();
        assert!(!health.is_ready());
        assert!(health.is_alive());

        health.task_queue = ComponentHealth::Healthy;
        health.allocation = ComponentHealth::Degraded;
        health.data_streams = ComponentHealth::Healthy;
        assert!(health.is_ready());

        health.task_queue = ComponentHealth::Failed;
        assert!(!health.is_alive());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = Config::default();
        config.cluster.nodes.clear();
        assert!(Runtime::new(config).is_err());
    }
}
