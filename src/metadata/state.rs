//! Immutable, versioned cluster state.
//!
//! A [`ClusterState`] is never modified in place. Changes go through
//! [`ClusterStateBuilder`] and [`MetadataBuilder`], which copy the previous
//! snapshot and validate the result before it can be published. Builders
//! preserve the version; the task queue assigns `previous + 1` when it
//! installs a state, so every installed version maps to exactly one task.

use crate::core::error::{StreamError, StreamResult};
use crate::metadata::data_stream::{DataStream, DataStreamAlias};
use crate::metadata::index::IndexMetadata;
use crate::metadata::routing::{IndexRoutingTable, RoutingTable};
use crate::metadata::template::ComposableTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of entity occupying a name in the shared namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Index,
    DataStream,
    Alias,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::DataStream => write!(f, "data stream"),
            Self::Alias => write!(f, "alias"),
        }
    }
}

/// Cluster metadata: indices, data streams, aliases and templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    indices: BTreeMap<String, IndexMetadata>,
    data_streams: BTreeMap<String, DataStream>,
    data_stream_aliases: BTreeMap<String, DataStreamAlias>,
    templates: BTreeMap<String, ComposableTemplate>,
}

impl Metadata {
    /// Start a builder from this metadata.
    pub fn builder(&self) -> MetadataBuilder {
        MetadataBuilder {
            metadata: self.clone(),
        }
    }

    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    pub fn indices(&self) -> &BTreeMap<String, IndexMetadata> {
        &self.indices
    }

    pub fn data_stream(&self, name: &str) -> Option<&DataStream> {
        self.data_streams.get(name)
    }

    pub fn data_streams(&self) -> &BTreeMap<String, DataStream> {
        &self.data_streams
    }

    pub fn data_stream_alias(&self, name: &str) -> Option<&DataStreamAlias> {
        self.data_stream_aliases.get(name)
    }

    pub fn data_stream_aliases(&self) -> &BTreeMap<String, DataStreamAlias> {
        &self.data_stream_aliases
    }

    pub fn template(&self, name: &str) -> Option<&ComposableTemplate> {
        self.templates.get(name)
    }

    pub fn templates(&self) -> &BTreeMap<String, ComposableTemplate> {
        &self.templates
    }

    /// What, if anything, already uses `name`.
    pub fn lookup_name(&self, name: &str) -> Option<NameKind> {
        if self.indices.contains_key(name) {
            Some(NameKind::Index)
        } else if self.data_streams.contains_key(name) {
            Some(NameKind::DataStream)
        } else if self.data_stream_aliases.contains_key(name) {
            Some(NameKind::Alias)
        } else {
            None
        }
    }

    /// Aliases that point at a data stream.
    pub fn aliases_for_data_stream(&self, data_stream: &str) -> Vec<&DataStreamAlias> {
        self.data_stream_aliases
            .values()
            .filter(|a| a.data_streams.contains(data_stream))
            .collect()
    }
}

/// Copy-on-write builder for [`Metadata`].
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    metadata: Metadata,
}

impl MetadataBuilder {
    /// Add or replace an index.
    pub fn put_index(mut self, index: IndexMetadata) -> Self {
        self.metadata
            .indices
            .insert(index.index.name.clone(), index);
        self
    }

    /// Add or replace a data stream.
    pub fn put_data_stream(mut self, data_stream: DataStream) -> Self {
        self.metadata
            .data_streams
            .insert(data_stream.name.clone(), data_stream);
        self
    }

    /// Point alias `alias` at `data_stream`, creating the alias if needed.
    pub fn put_data_stream_alias(
        mut self,
        alias: &str,
        data_stream: &str,
        is_write: Option<bool>,
        filter: Option<String>,
    ) -> Self {
        let updated = match self.metadata.data_stream_aliases.get(alias) {
            Some(existing) => existing.with_data_stream(data_stream, is_write, filter),
            None => DataStreamAlias::new(alias, data_stream, is_write == Some(true), filter),
        };
        self.metadata
            .data_stream_aliases
            .insert(alias.to_string(), updated);
        self
    }

    /// Add or replace a template.
    pub fn put_template(mut self, name: impl Into<String>, template: ComposableTemplate) -> Self {
        self.metadata.templates.insert(name.into(), template);
        self
    }

    /// Validate and produce the metadata.
    ///
    /// Fails if a name is used by two kinds of entity, a data stream has no
    /// backing index or references a missing one, or an alias references a
    /// missing data stream.
    pub fn build(self) -> StreamResult<Metadata> {
        let metadata = self.metadata;

        for name in metadata.data_streams.keys() {
            if metadata.indices.contains_key(name) {
                return Err(namespace_conflict(NameKind::DataStream, name, NameKind::Index));
            }
        }
        for name in metadata.data_stream_aliases.keys() {
            if metadata.indices.contains_key(name) {
                return Err(namespace_conflict(NameKind::Alias, name, NameKind::Index));
            }
            if metadata.data_streams.contains_key(name) {
                return Err(namespace_conflict(NameKind::Alias, name, NameKind::DataStream));
            }
        }

        for data_stream in metadata.data_streams.values() {
            if data_stream.indices.is_empty() {
                return Err(StreamError::internal(format!(
                    "data stream [{}] has no backing indices",
                    data_stream.name
                )));
            }
            for index in &data_stream.indices {
                match metadata.indices.get(&index.name) {
                    Some(existing) if existing.index == *index => {}
                    _ => {
                        return Err(StreamError::IndexNotFound {
                            index: index.name.clone(),
                        })
                    }
                }
            }
        }

        for alias in metadata.data_stream_aliases.values() {
            if let Some(missing) = alias
                .data_streams
                .iter()
                .find(|ds| !metadata.data_streams.contains_key(*ds))
            {
                return Err(StreamError::internal(format!(
                    "alias [{}] refers to missing data stream [{}]",
                    alias.name, missing
                )));
            }
        }

        Ok(metadata)
    }
}

fn namespace_conflict(kind: NameKind, name: &str, existing: NameKind) -> StreamError {
    let kind_str = match kind {
        NameKind::Index => "index",
        NameKind::DataStream => "data_stream",
        NameKind::Alias => "alias",
    };
    StreamError::InvalidName {
        kind: kind_str.to_string(),
        name: name.to_string(),
        reason: format!("conflicts with an existing {existing} of the same name"),
    }
}

/// Immutable snapshot of cluster metadata and shard routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    version: u64,
    cluster_name: String,
    nodes: Vec<String>,
    metadata: Metadata,
    routing_table: RoutingTable,
}

impl ClusterState {
    /// Initial state of an empty cluster, at version 0.
    pub fn new(cluster_name: impl Into<String>, nodes: Vec<String>) -> Self {
        Self {
            version: 0,
            cluster_name: cluster_name.into(),
            nodes,
            metadata: Metadata::default(),
            routing_table: RoutingTable::default(),
        }
    }

    /// Start a builder from this state.
    pub fn builder(&self) -> ClusterStateBuilder {
        ClusterStateBuilder {
            state: self.clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Stamp the version assigned at installation.
    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Copy-on-write builder for [`ClusterState`].
#[derive(Debug, Clone)]
pub struct ClusterStateBuilder {
    state: ClusterState,
}

impl ClusterStateBuilder {
    /// Replace the metadata.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.state.metadata = metadata;
        self
    }

    /// Replace the routing table.
    pub fn routing_table(mut self, routing_table: RoutingTable) -> Self {
        self.state.routing_table = routing_table;
        self
    }

    /// Add or replace routing for one index.
    pub fn put_index_routing(mut self, index: impl Into<String>, routing: IndexRoutingTable) -> Self {
        self.state.routing_table.indices.insert(index.into(), routing);
        self
    }

    /// Replace the node list.
    pub fn nodes(mut self, nodes: Vec<String>) -> Self {
        self.state.nodes = nodes;
        self
    }

    pub fn build(self) -> ClusterState {
        self.state
    }
}
