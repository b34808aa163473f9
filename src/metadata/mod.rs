//! Cluster metadata model.
//!
//! - [`state`] - Immutable cluster state and copy-on-write builders
//! - [`data_stream`] - Data streams and data stream aliases
//! - [`index`] - Index metadata, settings and mappings
//! - [`routing`] - Shard routing table
//! - [`template`] - Composable templates and template resolution
//! - [`system`] - System data stream registry
//! - [`naming`] - Naming rules shared by the index namespace

pub mod data_stream;
pub mod index;
pub mod naming;
pub mod routing;
pub mod state;
pub mod system;
pub mod template;

pub use data_stream::{DataStream, DataStreamAlias, DataStreamFlags, TimestampField};
pub use index::{IndexMetadata, IndexRef, Mapping, Settings};
pub use routing::{IndexRoutingTable, RoutingTable, ShardRouting, ShardState};
pub use state::{ClusterState, ClusterStateBuilder, Metadata, MetadataBuilder, NameKind};
pub use system::{SystemDataStreamDescriptor, SystemDataStreams};
pub use template::{ComposableTemplate, MetadataTemplateResolver, TemplateResolver};
