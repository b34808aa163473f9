//! Metadata services built on the task queue.
//!
//! - [`create_index`] - Index creation against cluster metadata
//! - [`active_shards`] - Waiting for shard copies to become active
//! - [`create_data_stream`] - Data stream creation and acknowledgment

pub mod active_shards;
pub mod create_data_stream;
pub mod create_index;

pub use active_shards::{
    ActiveShardCount, ActiveShardsObserver, ClusterActiveShardsObserver, ReadinessFuture,
    ShardsReadiness,
};
pub use create_data_stream::{
    create_data_stream_state, CreateDataStreamOutcome, CreateDataStreamRequest,
    CreateDataStreamService, CreatedDataStream, CreationPhase, CreationProgress,
    TransitionContext,
};
pub use create_index::{
    CreateIndexRequest, IndexCreationService, IndexDefaults, MetadataCreateIndexService,
};
