//! Data stream creation tests.
//!
//! Covers the state transition on its own and the full path through the
//! task queue, shard allocation and readiness wait.

mod common;

use common::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tributary::core::error::StreamError;
use tributary::metadata::index::settings;
use tributary::metadata::state::ClusterState;
use tributary::metadata::template::DataStreamTemplate;
use tributary::services::active_shards::ShardsReadiness;
use tributary::services::create_data_stream::{
    create_data_stream_state, CreateDataStreamOutcome, CreateDataStreamRequest, CreationPhase,
    CreationProgress,
};
use tributary::services::create_index::{
    CreateIndexRequest, IndexCreationService, IndexDefaults, MetadataCreateIndexService,
};

fn request(name: &str) -> CreateDataStreamRequest {
    CreateDataStreamRequest::at(name, START_TIME)
}

fn logs_state() -> ClusterState {
    cluster_state(1, &[("logs", logs_template())])
}

fn create_plain_index(state: &ClusterState, name: &str) -> ClusterState {
    MetadataCreateIndexService::default()
        .create_index(state, CreateIndexRequest::new("api", name, START_TIME))
        .expect("index created")
}

/// Index service that drops the mapping of every index it creates.
struct MappinglessIndexService;

impl IndexCreationService for MappinglessIndexService {
    fn create_index(
        &self,
        current: &ClusterState,
        request: CreateIndexRequest,
    ) -> tributary::core::error::StreamResult<ClusterState> {
        let name = request.index.clone();
        let state = MetadataCreateIndexService::default().create_index(current, request)?;
        let mut index = state.metadata().index(&name).cloned().expect("index exists");
        index.mapping = None;
        let metadata = state.metadata().builder().put_index(index).build()?;
        Ok(state.builder().metadata(metadata).build())
    }
}

/// Index service that always fails.
struct FailingIndexService;

impl IndexCreationService for FailingIndexService {
    fn create_index(
        &self,
        _current: &ClusterState,
        request: CreateIndexRequest,
    ) -> tributary::core::error::StreamResult<ClusterState> {
        Err(StreamError::invalid_request(format!(
            "cannot allocate [{}]",
            request.index
        )))
    }
}

/// Index service that panics.
struct PanickingIndexService;

impl IndexCreationService for PanickingIndexService {
    fn create_index(
        &self,
        _current: &ClusterState,
        _request: CreateIndexRequest,
    ) -> tributary::core::error::StreamResult<ClusterState> {
        panic!("index service exploded")
    }
}

// ============================================================================
// State transition
// ============================================================================

#[test]
fn transition_creates_first_backing_index() {
    let context = in_memory_context(Vec::new());
    let current = logs_state();

    let created = assert_ok(create_data_stream_state(
        &context,
        &current,
        &request("logs-app"),
        &[],
        None,
    ));

    let expected = first_backing_index("logs-app");
    assert_eq!(created.write_index.name, expected);
    assert_eq!(created.backing_indices.len(), 1);
    assert!(created.aliases.is_empty());

    let metadata = created.state.metadata();
    let data_stream = metadata.data_stream("logs-app").expect("data stream added");
    assert_eq!(data_stream.generation, 1);
    assert_eq!(data_stream.timestamp_field.name, "@timestamp");
    assert_eq!(data_stream.write_index().map(|i| i.name.as_str()), Some(expected.as_str()));
    assert!(!data_stream.is_hidden());
    assert!(!data_stream.is_system());
    assert!(!data_stream.is_replicated());

    let index = metadata.index(&expected).expect("backing index added");
    assert!(index.hidden);
    assert_eq!(index.data_stream.as_deref(), Some("logs-app"));
    assert!(index
        .mapping
        .as_ref()
        .is_some_and(|m| m.declares_timestamp_field("@timestamp")));
    assert_eq!(index.creation_date_millis, START_TIME);

    // The transition leaves version stamping to the queue.
    assert_eq!(created.state.version(), current.version());
    assert!(current.metadata().data_stream("logs-app").is_none());
}

#[test]
fn transition_rejects_existing_data_stream() {
    let context = in_memory_context(Vec::new());
    let created = assert_ok(create_data_stream_state(
        &context,
        &logs_state(),
        &request("logs-app"),
        &[],
        None,
    ));

    let err = assert_err(create_data_stream_state(
        &context,
        &created.state,
        &request("logs-app"),
        &[],
        None,
    ));
    assert!(matches!(err, StreamError::AlreadyExists { ref name } if name == "logs-app"));
    assert_eq!(err.status().code(), 400);
    assert!(err.is_rejection());
}

#[test]
fn transition_rejects_invalid_names() {
    let context = in_memory_context(Vec::new());
    let current = logs_state();

    for name in ["Logs-App", ".ds-logs", "logs app", "_logs", ""] {
        let err = assert_err(create_data_stream_state(
            &context,
            &current,
            &request(name),
            &[],
            None,
        ));
        assert!(
            matches!(err, StreamError::InvalidName { .. }),
            "expected InvalidName for {name:?}, got {err:?}"
        );
    }
}

#[test]
fn transition_rejects_name_used_by_index() {
    let context = in_memory_context(Vec::new());
    let current = create_plain_index(&logs_state(), "logs-app");

    let err = assert_err(create_data_stream_state(
        &context,
        &current,
        &request("logs-app"),
        &[],
        None,
    ));
    match err {
        StreamError::InvalidName { name, reason, .. } => {
            assert_eq!(name, "logs-app");
            assert!(reason.contains("index"), "reason: {reason}");
        }
        other => panic!("expected InvalidName, got {other:?}"),
    }
}

#[test]
fn transition_requires_data_stream_template() {
    let context = in_memory_context(Vec::new());

    let err = assert_err(create_data_stream_state(
        &context,
        &logs_state(),
        &request("metrics-app"),
        &[],
        None,
    ));
    assert!(matches!(err, StreamError::TemplateResolution { .. }));

    let mut plain = logs_template();
    plain.data_stream = None;
    let err = assert_err(create_data_stream_state(
        &context,
        &cluster_state(1, &[("logs", plain)]),
        &request("logs-app"),
        &[],
        None,
    ));
    assert!(matches!(err, StreamError::TemplateResolution { .. }));
}

#[test]
fn transition_reports_backing_index_conflict() {
    let context = in_memory_context(Vec::new());
    let current = create_plain_index(&logs_state(), &first_backing_index("logs-app"));

    let err = assert_err(create_data_stream_state(
        &context,
        &current,
        &request("logs-app"),
        &[],
        None,
    ));
    match &err {
        StreamError::AutoCreationConflict { data_stream, index } => {
            assert_eq!(data_stream, "logs-app");
            assert_eq!(index, &first_backing_index("logs-app"));
        }
        other => panic!("expected AutoCreationConflict, got {other:?}"),
    }
    assert_eq!(err.status().code(), 400);
}

#[test]
fn transition_attaches_template_aliases() {
    let template = logs_template_with_aliases(&[
        ("logs-all", Some(true), Some(r#"{"term":{"env":"prod"}}"#)),
        ("logs-read", None, None),
    ]);
    let context = in_memory_context(Vec::new());

    let created = assert_ok(create_data_stream_state(
        &context,
        &cluster_state(1, &[("logs", template)]),
        &request("logs-app"),
        &[],
        None,
    ));
    assert_eq!(created.aliases, vec!["logs-all".to_string(), "logs-read".to_string()]);

    let metadata = created.state.metadata();
    let write_alias = metadata.data_stream_alias("logs-all").expect("alias added");
    assert!(write_alias.is_write_data_stream("logs-app"));
    assert_eq!(write_alias.filter.as_deref(), Some(r#"{"term":{"env":"prod"}}"#));

    let read_alias = metadata.data_stream_alias("logs-read").expect("alias added");
    assert!(read_alias.data_streams.contains("logs-app"));
    assert_eq!(read_alias.write_data_stream, None);
    assert_eq!(metadata.aliases_for_data_stream("logs-app").len(), 2);
}

#[test]
fn transition_merges_alias_across_data_streams() {
    let template = logs_template_with_aliases(&[("logs-all", Some(true), None)]);
    let context = in_memory_context(Vec::new());
    let current = cluster_state(1, &[("logs", template)]);

    let first = assert_ok(create_data_stream_state(
        &context,
        &current,
        &request("logs-a"),
        &[],
        None,
    ));
    let second = assert_ok(create_data_stream_state(
        &context,
        &first.state,
        &request("logs-b"),
        &[],
        None,
    ));

    let alias = second
        .state
        .metadata()
        .data_stream_alias("logs-all")
        .expect("alias exists");
    assert_eq!(alias.data_streams.len(), 2);
    assert!(alias.is_write_data_stream("logs-b"));
}

#[test]
fn transition_system_data_stream() {
    let descriptor = system_descriptor(".tasks-history");
    let context = in_memory_context(vec![descriptor.clone()]);

    let created = assert_ok(create_data_stream_state(
        &context,
        &cluster_state(3, &[]),
        &request(".tasks-history").system_descriptor(descriptor),
        &[],
        None,
    ));

    let metadata = created.state.metadata();
    let data_stream = metadata.data_stream(".tasks-history").expect("added");
    assert!(data_stream.is_system());
    assert!(data_stream.is_hidden());

    let index = metadata.index(&created.write_index.name).expect("index");
    assert!(index.system);
    assert!(index.hidden);
    assert_eq!(
        index.settings.get(settings::AUTO_EXPAND_REPLICAS).map(String::as_str),
        Some("0-1")
    );
    assert_eq!(index.number_of_replicas, 1);
}

#[test]
fn transition_applies_template_data_stream_flags() {
    let mut template = logs_template();
    template.data_stream = Some(DataStreamTemplate {
        hidden: true,
        allow_custom_routing: true,
        ..Default::default()
    });
    let owner = BTreeMap::from([("owner".to_string(), serde_json::json!("team-a"))]);
    template.metadata = Some(owner.clone());
    let context = in_memory_context(Vec::new());

    let created = assert_ok(create_data_stream_state(
        &context,
        &cluster_state(1, &[("logs", template)]),
        &request("logs-app"),
        &[],
        None,
    ));

    let data_stream = created
        .state
        .metadata()
        .data_stream("logs-app")
        .expect("added");
    assert!(data_stream.is_hidden());
    assert!(!data_stream.is_system());
    assert!(data_stream.allows_custom_routing());
    assert_eq!(data_stream.metadata, Some(owner));

    // Defaults leave every flag off and no metadata.
    let created = assert_ok(create_data_stream_state(
        &context,
        &logs_state(),
        &request("logs-web"),
        &[],
        None,
    ));
    let data_stream = created
        .state
        .metadata()
        .data_stream("logs-web")
        .expect("added");
    assert!(!data_stream.is_hidden());
    assert!(!data_stream.allows_custom_routing());
    assert_eq!(data_stream.metadata, None);
}

#[test]
fn transition_checks_system_descriptor() {
    let descriptor = system_descriptor(".tasks-history");
    let context = in_memory_context(vec![descriptor.clone()]);
    let current = logs_state();

    // Registered system name without a descriptor.
    let err = assert_err(create_data_stream_state(
        &context,
        &current,
        &request(".tasks-history"),
        &[],
        None,
    ));
    assert!(err.is_internal(), "got {err:?}");

    // Descriptor for a name that is not registered.
    let err = assert_err(create_data_stream_state(
        &context,
        &current,
        &request("logs-app").system_descriptor(descriptor),
        &[],
        None,
    ));
    assert!(err.is_internal(), "got {err:?}");
}

#[test]
fn transition_adopts_existing_backing_indices() {
    let context = in_memory_context(Vec::new());
    let current = create_plain_index(&logs_state(), "logs-app-old");

    let created = assert_ok(create_data_stream_state(
        &context,
        &current,
        &request("logs-app"),
        &["logs-app-old".to_string()],
        None,
    ));
    assert_eq!(created.backing_indices.len(), 2);
    assert_eq!(created.backing_indices[0].name, "logs-app-old");
    assert_eq!(created.write_index.name, first_backing_index("logs-app"));

    let metadata = created.state.metadata();
    let data_stream = metadata.data_stream("logs-app").expect("added");
    assert_eq!(data_stream.indices.len(), 2);
    assert_eq!(
        metadata.index("logs-app-old").and_then(|i| i.data_stream.as_deref()),
        Some("logs-app")
    );
}

#[test]
fn transition_uses_supplied_write_index() {
    let context = in_memory_context(Vec::new());
    let state = create_plain_index(&logs_state(), "logs-app-1");
    let state = MetadataCreateIndexService::new(IndexDefaults::default())
        .create_index(
            &state,
            CreateIndexRequest::new("migrate", "logs-app-2", START_TIME)
                .template(logs_template())
                .data_stream("logs-app"),
        )
        .expect("write index created");

    let created = assert_ok(create_data_stream_state(
        &context,
        &state,
        &request("logs-app"),
        &["logs-app-1".to_string()],
        Some("logs-app-2"),
    ));
    assert_eq!(created.write_index.name, "logs-app-2");
    let data_stream = created.state.metadata().data_stream("logs-app").expect("added");
    let names: Vec<&str> = data_stream.indices.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["logs-app-1", "logs-app-2"]);
    assert!(created
        .state
        .metadata()
        .index(&first_backing_index("logs-app"))
        .is_none());
}

#[test]
fn transition_rejects_unusable_backing_indices() {
    let context = in_memory_context(Vec::new());
    let current = logs_state();

    let err = assert_err(create_data_stream_state(
        &context,
        &current,
        &request("logs-app"),
        &["missing".to_string()],
        None,
    ));
    assert!(matches!(err, StreamError::DataStream { .. }));
    assert!(matches!(err.root(), StreamError::IndexNotFound { index } if index == "missing"));
    assert_eq!(err.status().code(), 404);

    let owned = MetadataCreateIndexService::default()
        .create_index(
            &current,
            CreateIndexRequest::new("api", "owned", START_TIME)
                .template(logs_template())
                .data_stream("logs-other"),
        )
        .expect("index created");
    let err = assert_err(create_data_stream_state(
        &context,
        &owned,
        &request("logs-app"),
        &["owned".to_string()],
        None,
    ));
    assert!(matches!(err, StreamError::InvalidRequest { .. }));

    let state = create_plain_index(&current, "logs-app-1");
    let err = assert_err(create_data_stream_state(
        &context,
        &state,
        &request("logs-app"),
        &["logs-app-1".to_string()],
        Some("logs-app-1"),
    ));
    assert!(matches!(err, StreamError::InvalidRequest { .. }));
}

#[test]
fn transition_detects_missing_timestamp_mapping() {
    let context = context_with_index_service(Arc::new(MappinglessIndexService), Vec::new());

    let err = assert_err(create_data_stream_state(
        &context,
        &logs_state(),
        &request("logs-app"),
        &[],
        None,
    ));
    assert!(matches!(err, StreamError::StructuralInvariant { .. }));
    assert!(err.is_internal());
    assert_eq!(err.status().code(), 500);
}

#[test]
fn transition_wraps_index_service_failures() {
    let context = context_with_index_service(Arc::new(FailingIndexService), Vec::new());

    let err = assert_err(create_data_stream_state(
        &context,
        &logs_state(),
        &request("logs-app"),
        &[],
        None,
    ));
    match &err {
        StreamError::DataStream { name, .. } => assert_eq!(name, "logs-app"),
        other => panic!("expected DataStream context, got {other:?}"),
    }
    assert!(matches!(err.root(), StreamError::InvalidRequest { .. }));
    assert!(err.to_string().contains("logs-app"));
}

#[test]
fn transition_rejects_keyword_timestamp() {
    let mut template = logs_template();
    let mut mapping = tributary::metadata::index::Mapping::default();
    mapping.properties.insert(
        "@timestamp".to_string(),
        tributary::metadata::index::FieldMapping::new("keyword"),
    );
    template.template = Some(tributary::metadata::template::TemplateBody {
        mappings: Some(mapping),
        ..Default::default()
    });
    let context = in_memory_context(Vec::new());

    let err = assert_err(create_data_stream_state(
        &context,
        &cluster_state(1, &[("logs", template)]),
        &request("logs-app"),
        &[],
        None,
    ));
    assert!(matches!(err.root(), StreamError::InvalidRequest { .. }), "got {err:?}");
}

// ============================================================================
// Through the queue
// ============================================================================

#[tokio::test(start_paused = true)]
async fn create_acknowledged_once_shards_start() {
    let harness = Harness::start();
    let version = harness.version();

    let mut progress = CreationProgress::new("logs-app");
    let outcome = assert_ok(
        harness
            .service
            .create_data_stream_tracked(
                harness.service.request("logs-app").ack_timeout(Duration::from_secs(5)),
                &mut progress,
            )
            .await,
    );
    assert_eq!(
        outcome,
        CreateDataStreamOutcome::Acknowledged {
            write_index: first_backing_index("logs-app")
        }
    );
    assert_eq!(
        progress.history(),
        &[
            CreationPhase::Pending,
            CreationPhase::Committed,
            CreationPhase::ReadinessAwaited,
            CreationPhase::Acknowledged
        ]
    );

    let state = harness.queue.state();
    assert!(state.version() > version);
    assert!(state.metadata().data_stream("logs-app").is_some());
    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.data_streams_created, 1);
    assert_eq!(snapshot.readiness_timeouts, 0);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_keeps_data_stream() {
    let harness = Harness::new(HarnessOptions {
        auto_start: None,
        ..HarnessOptions::default()
    });

    let acknowledged = assert_ok(
        harness
            .service
            .create_data_stream(
                harness.service.request("logs-app").ack_timeout(Duration::from_millis(200)),
            )
            .await,
    );
    assert!(!acknowledged);
    assert!(harness.queue.state().metadata().data_stream("logs-app").is_some());
    assert_eq!(harness.metrics.snapshot().readiness_timeouts, 1);

    // Readiness is not retried, but a second create now fails.
    let err = assert_err(
        harness
            .service
            .create_data_stream(harness.service.request("logs-app"))
            .await,
    );
    assert!(matches!(err, StreamError::AlreadyExists { .. }));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn zero_ack_timeout_checks_once() {
    let harness = Harness::new(HarnessOptions {
        auto_start: None,
        ..HarnessOptions::default()
    });

    let outcome = assert_ok(
        harness
            .service
            .create_data_stream_detailed(harness.service.request("logs-app"))
            .await,
    );
    assert_eq!(
        outcome,
        CreateDataStreamOutcome::ReadinessTimedOut {
            write_index: first_backing_index("logs-app")
        }
    );
    let err = assert_err(outcome.require_ready(Duration::ZERO));
    assert!(matches!(err, StreamError::ReadinessTimeout { .. }));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_creates_of_same_name() {
    let harness = Harness::new(HarnessOptions {
        observer: Some(Arc::new(FixedObserver(ShardsReadiness::Ready))),
        auto_start: None,
        ..HarnessOptions::default()
    });

    let (first, second) = tokio::join!(
        harness.service.create_data_stream(harness.service.request("logs-app")),
        harness.service.create_data_stream(harness.service.request("logs-app")),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| matches!(r, Ok(true))).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(StreamError::AlreadyExists { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(harness.queue.state().metadata().data_streams().len(), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejection_leaves_state_unchanged() {
    let harness = Harness::new(HarnessOptions {
        auto_start: None,
        ..HarnessOptions::default()
    });
    let before = harness.queue.state();

    for name in ["Logs-App", ".ds-logs-app", "metrics-app"] {
        let err = assert_err(
            harness
                .service
                .create_data_stream(harness.service.request(name))
                .await,
        );
        assert!(err.is_rejection(), "{name}: {err:?}");
    }

    let after = harness.queue.state();
    assert_eq!(after.version(), before.version());
    assert_eq!(*after, *before);
    assert_eq!(harness.metrics.snapshot().tasks_rejected, 3);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn not_committed_installs_nothing() {
    let publisher = Arc::new(SwitchPublisher::new(false));
    let harness = Harness::new(HarnessOptions {
        publisher: publisher.clone(),
        auto_start: None,
        ..HarnessOptions::default()
    });

    let outcome = assert_ok(
        harness
            .service
            .create_data_stream_detailed(harness.service.request("logs-app"))
            .await,
    );
    assert_eq!(
        outcome,
        CreateDataStreamOutcome::NotCommitted {
            data_stream: "logs-app".to_string()
        }
    );
    assert_eq!(outcome.write_index(), None);
    assert!(harness.queue.state().metadata().data_stream("logs-app").is_none());
    assert_eq!(harness.version(), 0);

    publisher.set_commit(true);
    let acknowledged = assert_ok(
        harness
            .service
            .create_data_stream(harness.service.request("logs-app"))
            .await,
    );
    assert!(!acknowledged);
    assert_eq!(harness.version(), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn system_request_uses_registered_descriptor() {
    let harness = Harness::new(HarnessOptions {
        system: vec![system_descriptor(".tasks-history")],
        observer: Some(Arc::new(FixedObserver(ShardsReadiness::Ready))),
        auto_start: None,
        ..HarnessOptions::default()
    });

    let request = assert_ok(harness.service.system_request(".tasks-history"));
    assert!(request.is_system());
    assert!(assert_ok(harness.service.create_data_stream(request).await));

    let state = harness.queue.state();
    let data_stream = state.metadata().data_stream(".tasks-history").expect("added");
    assert!(data_stream.is_system() && data_stream.is_hidden());

    assert!(harness.service.system_request("logs-app").is_err());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_index_service_fails_task() {
    let harness = Harness::new(HarnessOptions {
        auto_start: None,
        ..HarnessOptions::default()
    });
    let service = tributary::services::create_data_stream::CreateDataStreamService::new(
        harness.queue.clone(),
        context_with_index_service(Arc::new(PanickingIndexService), Vec::new()),
        Arc::new(FixedObserver(ShardsReadiness::Ready)),
        Arc::new(tributary::core::time::ManualClock::new(START_TIME)),
        harness.metrics.clone(),
    );

    let mut progress = CreationProgress::new("logs-app");
    let err = assert_err(
        service
            .create_data_stream_tracked(service.request("logs-app"), &mut progress)
            .await,
    );
    match &err {
        StreamError::TaskFailed { message, .. } => {
            assert!(message.contains("index service exploded"))
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(progress.phase(), CreationPhase::Rejected);
    assert_eq!(harness.metrics.snapshot().tasks_failed, 1);

    // The queue keeps working.
    assert_ok(
        harness
            .service
            .create_data_stream(harness.service.request("logs-app"))
            .await,
    );
    assert!(harness.queue.state().metadata().data_stream("logs-app").is_some());

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_timeout_is_ambiguous() {
    let harness = Harness::new(HarnessOptions {
        observer: Some(Arc::new(FixedObserver(ShardsReadiness::Ready))),
        auto_start: None,
        ..HarnessOptions::default()
    });

    // Occupy the worker until released.
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let blocker = harness.queue.submit(
        "blocker",
        tributary::cluster::task_queue::Priority::Immediate,
        move |current| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            Ok((current.clone(), ()))
        },
    );

    let mut states = harness.queue.subscribe();
    let mut progress = CreationProgress::new("logs-app");
    let err = assert_err(
        harness
            .service
            .create_data_stream_tracked(
                harness
                    .service
                    .request("logs-app")
                    .commit_timeout(Duration::from_millis(50)),
                &mut progress,
            )
            .await,
    );
    assert!(matches!(err, StreamError::CommitTimeout { timeout_ms: 50, .. }));
    assert!(err.is_ambiguous());
    assert_eq!(err.status().code(), 503);
    assert_eq!(progress.phase(), CreationPhase::CommitTimedOut);
    assert_eq!(harness.metrics.snapshot().commit_timeouts, 1);

    // The queued task still applies once the worker is free.
    release_tx.send(()).expect("blocker waiting");
    assert_ok(blocker.wait().await);
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if states.borrow_and_update().metadata().data_stream("logs-app").is_some() {
                break;
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("data stream applied after the commit timeout");
    assert!(harness.queue.state().metadata().data_stream("logs-app").is_some());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn direct_transition_bypasses_queue() {
    let harness = Harness::new(HarnessOptions {
        auto_start: None,
        ..HarnessOptions::default()
    });
    let current = harness.queue.state();

    let next = assert_ok(
        harness
            .service
            .create_data_stream_direct(&request("logs-app"), &current),
    );
    assert!(next.metadata().data_stream("logs-app").is_some());
    assert_eq!(harness.version(), current.version());
    assert!(harness.queue.state().metadata().data_stream("logs-app").is_none());

    harness.stop().await;
}
