//! Data stream creation.
//!
//! Creation happens in two phases:
//! 1. A cluster state task runs [`create_data_stream_state`]: it validates
//!    the request, creates the first backing index, attaches template aliases
//!    and returns the derived state. The task queue publishes it.
//! 2. Once committed, [`CreateDataStreamService`] waits for the write index's
//!    shards to become active before acknowledging.
//!
//! A readiness timeout never rolls the commit back; the data stream exists
//! and the caller gets `false`.

use crate::cluster::task_queue::{ClusterStateTaskQueue, Priority};
use crate::core::error::{StreamError, StreamResult};
use crate::core::time::{Clock, SystemClock};
use crate::metadata::data_stream::{DataStream, DataStreamFlags, TimestampField};
use crate::metadata::index::{hidden_index_settings, system_index_default_settings, IndexRef};
use crate::metadata::naming::{default_backing_index_name, validate_data_stream_name};
use crate::metadata::state::{ClusterState, NameKind};
use crate::metadata::system::{SystemDataStreamDescriptor, SystemDataStreams};
use crate::metadata::template::{resolve_aliases, TemplateResolver};
use crate::ops::observability::StreamMetrics;
use crate::services::active_shards::{ActiveShardCount, ActiveShardsObserver, ShardsReadiness};
use crate::services::create_index::{CreateIndexRequest, IndexCreationService};
use std::sync::Arc;
use std::time::Duration;

/// Cause recorded on backing indices created with a data stream.
const INITIALIZE_CAUSE: &str = "initialize_data_stream";

/// Request to create a data stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDataStreamRequest {
    pub name: String,
    /// Names the first backing index; sampled when the request is built.
    pub start_time_millis: u64,
    /// Present for system data streams.
    pub system_descriptor: Option<SystemDataStreamDescriptor>,
    /// Bound on the wait for the commit; zero waits without bound.
    pub commit_timeout: Duration,
    /// Bound on the wait for active shards; zero checks once.
    pub ack_timeout: Duration,
}

impl CreateDataStreamRequest {
    /// Request stamped with the current system time.
    pub fn new(name: impl Into<String>) -> Self {
        Self::at(name, SystemClock.now_millis())
    }

    pub fn at(name: impl Into<String>, start_time_millis: u64) -> Self {
        Self {
            name: name.into(),
            start_time_millis,
            system_descriptor: None,
            commit_timeout: Duration::ZERO,
            ack_timeout: Duration::ZERO,
        }
    }

    pub fn system_descriptor(mut self, descriptor: SystemDataStreamDescriptor) -> Self {
        self.system_descriptor = Some(descriptor);
        self
    }

    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn is_system(&self) -> bool {
        self.system_descriptor.is_some()
    }
}

/// Collaborators used by the creation transition.
#[derive(Clone)]
pub struct TransitionContext {
    pub index_service: Arc<dyn IndexCreationService>,
    pub template_resolver: Arc<dyn TemplateResolver>,
    pub system_data_streams: Arc<SystemDataStreams>,
}

impl TransitionContext {
    pub fn new(
        index_service: Arc<dyn IndexCreationService>,
        template_resolver: Arc<dyn TemplateResolver>,
        system_data_streams: Arc<SystemDataStreams>,
    ) -> Self {
        Self {
            index_service,
            template_resolver,
            system_data_streams,
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct CreatedDataStream {
    /// Derived state, not yet published.
    pub state: ClusterState,
    pub write_index: IndexRef,
    /// All backing indices, write index last.
    pub backing_indices: Vec<IndexRef>,
    /// Names of the aliases attached from the template.
    pub aliases: Vec<String>,
}

/// Derive the state that contains a new data stream.
///
/// Checks run in a fixed order and the first failure wins: system descriptor
/// consistency, existing data stream, naming rules, name collisions, template
/// resolution. `backing_indices` and `write_index` name existing indices that
/// the data stream takes over; without a `write_index` a new backing index is
/// created.
pub fn create_data_stream_state(
    context: &TransitionContext,
    current: &ClusterState,
    request: &CreateDataStreamRequest,
    backing_indices: &[String],
    write_index: Option<&str>,
) -> StreamResult<CreatedDataStream> {
    let name = request.name.as_str();
    let system = request.is_system();

    context
        .system_data_streams
        .check_descriptor(name, request.system_descriptor.as_ref())?;

    if current.metadata().data_stream(name).is_some() {
        return Err(StreamError::AlreadyExists {
            name: name.to_string(),
        });
    }
    validate_data_stream_name(name)?;
    if let Some(kind @ (NameKind::Index | NameKind::Alias)) = current.metadata().lookup_name(name) {
        return Err(StreamError::invalid_name(
            name,
            format!("already exists as {kind}"),
        ));
    }

    let template = match &request.system_descriptor {
        Some(descriptor) => descriptor.template.clone(),
        None => context.template_resolver.resolve(name, current.metadata())?,
    };
    let data_stream_template = template.data_stream.clone().ok_or_else(|| {
        StreamError::template_resolution(
            name,
            format!("template for data stream [{name}] has no data stream template"),
        )
    })?;
    let timestamp_field = TimestampField::new(data_stream_template.timestamp_field.clone());

    if let Some(write) = write_index {
        if backing_indices.iter().any(|b| b == write) {
            return Err(StreamError::invalid_request(format!(
                "write index [{write}] of data stream [{name}] is also listed as a backing index"
            )));
        }
    }
    let mut backing = existing_indices(current, name, backing_indices)?;

    let (state, write_ref) = match write_index {
        Some(write) => {
            let write_ref = existing_indices(current, name, &[write.to_string()])?
                .pop()
                .ok_or_else(|| StreamError::internal("write index lookup returned nothing"))?;
            (current.clone(), write_ref)
        }
        None => {
            let index_name = default_backing_index_name(name, 1, request.start_time_millis);
            let settings = if system {
                system_index_default_settings()
            } else {
                hidden_index_settings()
            };
            let create = CreateIndexRequest::new(INITIALIZE_CAUSE, &index_name, request.start_time_millis)
                .settings(settings)
                .template(template.clone())
                .data_stream(name)
                .system(system);

            let state = context
                .index_service
                .create_index(current, create)
                .map_err(|err| match err {
                    StreamError::IndexAlreadyExists { index } => StreamError::AutoCreationConflict {
                        data_stream: name.to_string(),
                        index,
                    },
                    other => other.for_data_stream(name),
                })?;
            let write_ref = state
                .metadata()
                .index(&index_name)
                .map(|m| m.index.clone())
                .ok_or_else(|| StreamError::StructuralInvariant {
                    index: index_name.clone(),
                    message: "index creation service did not add the index".to_string(),
                })?;
            (state, write_ref)
        }
    };

    let declares_timestamp = state
        .metadata()
        .index(&write_ref.name)
        .and_then(|m| m.mapping.as_ref())
        .is_some_and(|m| m.declares_timestamp_field(&timestamp_field.name));
    if !declares_timestamp {
        tracing::error!(
            data_stream = %name,
            index = %write_ref,
            timestamp_field = %timestamp_field.name,
            "write index mapping does not declare the timestamp field"
        );
        return Err(StreamError::StructuralInvariant {
            index: write_ref.name.clone(),
            message: format!(
                "mapping must declare data stream timestamp field [{}]",
                timestamp_field.name
            ),
        });
    }

    let mut flags = DataStreamFlags::empty();
    flags.set(DataStreamFlags::HIDDEN, system || data_stream_template.hidden);
    flags.set(DataStreamFlags::SYSTEM, system);
    flags.set(
        DataStreamFlags::ALLOW_CUSTOM_ROUTING,
        data_stream_template.allow_custom_routing,
    );
    backing.push(write_ref.clone());
    let data_stream = DataStream::new(
        name,
        timestamp_field,
        backing.clone(),
        1,
        template.metadata.clone(),
        flags,
    );

    let mut builder = state.metadata().builder();
    for index_ref in &backing {
        if let Some(meta) = state.metadata().index(&index_ref.name) {
            if meta.data_stream.as_deref() != Some(name) {
                let mut owned = meta.clone();
                owned.data_stream = Some(name.to_string());
                builder = builder.put_index(owned);
            }
        }
    }
    builder = builder.put_data_stream(data_stream);

    let aliases = resolve_aliases(&template)?;
    for alias in &aliases {
        builder = builder.put_data_stream_alias(
            &alias.name,
            name,
            alias.is_write_index,
            alias.filter.clone(),
        );
    }
    let metadata = builder.build().map_err(|err| err.for_data_stream(name))?;
    let alias_names: Vec<String> = aliases.into_iter().map(|a| a.name).collect();

    tracing::info!(
        data_stream = %name,
        write_index = %write_ref.name,
        backing_indices = ?backing_indices,
        aliases = ?alias_names,
        system,
        "adding data stream"
    );

    Ok(CreatedDataStream {
        state: state.builder().metadata(metadata).build(),
        write_index: write_ref,
        backing_indices: backing,
        aliases: alias_names,
    })
}

fn existing_indices(
    current: &ClusterState,
    data_stream: &str,
    names: &[String],
) -> StreamResult<Vec<IndexRef>> {
    names
        .iter()
        .map(|index| {
            let meta = current.metadata().index(index).ok_or_else(|| {
                StreamError::IndexNotFound {
                    index: index.clone(),
                }
                .for_data_stream(data_stream)
            })?;
            match meta.data_stream.as_deref() {
                Some(owner) if owner != data_stream => Err(StreamError::invalid_request(format!(
                    "index [{index}] already backs data stream [{owner}]"
                ))),
                _ => Ok(meta.index.clone()),
            }
        })
        .collect()
}

/// Phase of one creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPhase {
    /// Submitted, waiting for the task to run.
    Pending,
    /// The new state was committed.
    Committed,
    /// Waiting for the write index's shards.
    ReadinessAwaited,
    /// Committed and ready.
    Acknowledged,
    /// Committed, but shards were not ready in time.
    ReadinessTimedOut,
    /// The task failed; nothing was committed.
    Rejected,
    /// Publication did not commit; nothing was installed.
    NotCommitted,
    /// The commit wait expired; the task may still apply.
    CommitTimedOut,
}

impl CreationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acknowledged
                | Self::ReadinessTimedOut
                | Self::Rejected
                | Self::NotCommitted
                | Self::CommitTimedOut
        )
    }

    pub fn can_transition_to(&self, next: CreationPhase) -> bool {
        use CreationPhase::*;
        matches!(
            (self, next),
            (Pending, Committed | Rejected | NotCommitted | CommitTimedOut)
                | (Committed, ReadinessAwaited)
                | (ReadinessAwaited, Acknowledged | ReadinessTimedOut)
        )
    }
}

impl std::fmt::Display for CreationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::ReadinessAwaited => "readiness_awaited",
            Self::Acknowledged => "acknowledged",
            Self::ReadinessTimedOut => "readiness_timed_out",
            Self::Rejected => "rejected",
            Self::NotCommitted => "not_committed",
            Self::CommitTimedOut => "commit_timed_out",
        };
        f.write_str(name)
    }
}

/// Phases a creation request has gone through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationProgress {
    data_stream: String,
    history: Vec<CreationPhase>,
}

impl CreationProgress {
    pub fn new(data_stream: impl Into<String>) -> Self {
        Self {
            data_stream: data_stream.into(),
            history: vec![CreationPhase::Pending],
        }
    }

    pub fn phase(&self) -> CreationPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(CreationPhase::Pending)
    }

    pub fn history(&self) -> &[CreationPhase] {
        &self.history
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn advance(&mut self, next: CreationPhase) -> StreamResult<()> {
        let current = self.phase();
        if !current.can_transition_to(next) {
            return Err(StreamError::internal(format!(
                "data stream [{}] cannot move from [{current}] to [{next}]",
                self.data_stream
            )));
        }
        tracing::debug!(data_stream = %self.data_stream, from = %current, to = %next, "creation phase");
        self.history.push(next);
        Ok(())
    }
}

/// Outcome of a creation request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateDataStreamOutcome {
    /// Committed and the write index is ready.
    Acknowledged { write_index: String },
    /// Committed, but the write index was not ready within the ack timeout.
    ReadinessTimedOut { write_index: String },
    /// Publication did not commit.
    NotCommitted { data_stream: String },
}

impl CreateDataStreamOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }

    /// Write index name, when the data stream was committed.
    pub fn write_index(&self) -> Option<&str> {
        match self {
            Self::Acknowledged { write_index } | Self::ReadinessTimedOut { write_index } => {
                Some(write_index)
            }
            Self::NotCommitted { .. } => None,
        }
    }

    /// Turn anything short of acknowledgment into an error.
    pub fn require_ready(self, ack_timeout: Duration) -> StreamResult<String> {
        match self {
            Self::Acknowledged { write_index } => Ok(write_index),
            Self::ReadinessTimedOut { write_index } => Err(StreamError::ReadinessTimeout {
                index: write_index,
                timeout_ms: ack_timeout.as_millis() as u64,
            }),
            Self::NotCommitted { data_stream } => Err(StreamError::internal(format!(
                "publication of data stream [{data_stream}] was not committed"
            ))),
        }
    }
}

/// Creates data streams through the task queue and acknowledges them once
/// their write index is ready.
#[derive(Clone)]
pub struct CreateDataStreamService {
    queue: ClusterStateTaskQueue,
    context: TransitionContext,
    observer: Arc<dyn ActiveShardsObserver>,
    clock: Arc<dyn Clock>,
    metrics: Arc<StreamMetrics>,
}

impl CreateDataStreamService {
    pub fn new(
        queue: ClusterStateTaskQueue,
        context: TransitionContext,
        observer: Arc<dyn ActiveShardsObserver>,
        clock: Arc<dyn Clock>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            queue,
            context,
            observer,
            clock,
            metrics,
        }
    }

    /// Request for `name`, stamped with this service's clock.
    pub fn request(&self, name: impl Into<String>) -> CreateDataStreamRequest {
        CreateDataStreamRequest::at(name, self.clock.now_millis())
    }

    /// Request for a registered system data stream.
    pub fn system_request(&self, name: &str) -> StreamResult<CreateDataStreamRequest> {
        let descriptor = self
            .context
            .system_data_streams
            .get(name)
            .cloned()
            .ok_or_else(|| {
                StreamError::invalid_request(format!("[{name}] is not a system data stream"))
            })?;
        Ok(self.request(name).system_descriptor(descriptor))
    }

    /// Create a data stream; `true` only when committed and ready.
    pub async fn create_data_stream(&self, request: CreateDataStreamRequest) -> StreamResult<bool> {
        Ok(self
            .create_data_stream_detailed(request)
            .await?
            .is_acknowledged())
    }

    /// Create a data stream and report how far it got.
    pub async fn create_data_stream_detailed(
        &self,
        request: CreateDataStreamRequest,
    ) -> StreamResult<CreateDataStreamOutcome> {
        let mut progress = CreationProgress::new(&request.name);
        self.create_data_stream_tracked(request, &mut progress).await
    }

    /// Like [`Self::create_data_stream_detailed`], recording each phase in
    /// `progress`.
    pub async fn create_data_stream_tracked(
        &self,
        request: CreateDataStreamRequest,
        progress: &mut CreationProgress,
    ) -> StreamResult<CreateDataStreamOutcome> {
        let name = request.name.clone();
        let commit_timeout = request.commit_timeout;
        let ack_timeout = request.ack_timeout;

        let context = self.context.clone();
        let task_request = request.clone();
        let handle = self.queue.submit(
            format!("create-data-stream [{name}]"),
            Priority::High,
            move |current| {
                let created = create_data_stream_state(&context, current, &task_request, &[], None)?;
                Ok((created.state, created.write_index.name))
            },
        );

        let completion = match handle.wait_timeout(commit_timeout).await {
            Ok(completion) => completion,
            Err(err) => {
                if err.is_ambiguous() {
                    self.metrics.record_commit_timeout();
                    progress.advance(CreationPhase::CommitTimedOut)?;
                    tracing::warn!(data_stream = %name, error = %err, "data stream commit outcome unknown");
                } else {
                    progress.advance(CreationPhase::Rejected)?;
                    tracing::debug!(data_stream = %name, error = %err, "data stream creation rejected");
                }
                return Err(err);
            }
        };

        if !completion.acknowledged {
            progress.advance(CreationPhase::NotCommitted)?;
            return Ok(CreateDataStreamOutcome::NotCommitted { data_stream: name });
        }
        progress.advance(CreationPhase::Committed)?;
        self.metrics.record_data_stream_created();

        let write_index = completion.output;
        progress.advance(CreationPhase::ReadinessAwaited)?;
        let readiness = self
            .observer
            .wait_for_active_shards(
                vec![write_index.clone()],
                ActiveShardCount::Default,
                ack_timeout,
            )
            .await;

        match readiness {
            ShardsReadiness::Ready => {
                progress.advance(CreationPhase::Acknowledged)?;
                Ok(CreateDataStreamOutcome::Acknowledged { write_index })
            }
            ShardsReadiness::TimedOut => {
                self.metrics.record_readiness_timeout();
                progress.advance(CreationPhase::ReadinessTimedOut)?;
                tracing::warn!(
                    data_stream = %name,
                    write_index = %write_index,
                    ack_timeout_ms = ack_timeout.as_millis() as u64,
                    "data stream created but write index shards not active in time"
                );
                Ok(CreateDataStreamOutcome::ReadinessTimedOut { write_index })
            }
        }
    }

    /// Run the transition against `current` without going through the queue.
    ///
    /// For callers that already execute inside a cluster state task.
    pub fn create_data_stream_direct(
        &self,
        request: &CreateDataStreamRequest,
        current: &ClusterState,
    ) -> StreamResult<ClusterState> {
        create_data_stream_state(&self.context, current, request, &[], None).map(|c| c.state)
    }

    pub fn queue(&self) -> &ClusterStateTaskQueue {
        &self.queue
    }
}
