//! Index creation.
//!
//! Creates one index on top of a cluster state: resolves its settings and
//! mapping, assigns a uuid, and adds an unassigned routing table that is
//! immediately allocated to nodes. Backing indices of data streams get the
//! `_data_stream_timestamp` meta field.

use crate::cluster::allocation::assign_shards;
use crate::core::error::{StreamError, StreamResult};
use crate::metadata::data_stream::DEFAULT_TIMESTAMP_FIELD;
use crate::metadata::index::{
    bool_setting, settings, u32_setting, validate_timestamp_field_mapping, DataStreamTimestampMeta,
    FieldMapping, IndexMetadata, IndexRef, Mapping, Settings, TIMESTAMP_FIELD_TYPES,
};
use crate::metadata::naming::validate_index_or_alias_name;
use crate::metadata::routing::IndexRoutingTable;
use crate::metadata::state::{ClusterState, NameKind};
use crate::metadata::template::ComposableTemplate;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Request to create one index.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    /// Why the index is being created, for logs.
    pub cause: String,
    pub index: String,
    /// Settings that override the template's.
    pub settings: Settings,
    /// Template whose settings and mappings apply.
    pub template: Option<ComposableTemplate>,
    /// Owning data stream, for backing indices.
    pub data_stream: Option<String>,
    pub system: bool,
    pub creation_date_millis: u64,
}

impl CreateIndexRequest {
    pub fn new(cause: impl Into<String>, index: impl Into<String>, creation_date_millis: u64) -> Self {
        Self {
            cause: cause.into(),
            index: index.into(),
            settings: Settings::new(),
            template: None,
            data_stream: None,
            system: false,
            creation_date_millis,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn template(mut self, template: ComposableTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn data_stream(mut self, name: impl Into<String>) -> Self {
        self.data_stream = Some(name.into());
        self
    }

    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }
}

/// Creates indices on behalf of other state transitions.
pub trait IndexCreationService: Send + Sync {
    /// Return `current` plus the new index.
    ///
    /// Fails with [`StreamError::IndexAlreadyExists`] when the name is taken
    /// by an index.
    fn create_index(
        &self,
        current: &ClusterState,
        request: CreateIndexRequest,
    ) -> StreamResult<ClusterState>;
}

/// Shard and replica counts used when settings do not name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDefaults {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexDefaults {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

/// Index creation against in-memory cluster metadata.
#[derive(Debug, Clone, Default)]
pub struct MetadataCreateIndexService {
    defaults: IndexDefaults,
}

impl MetadataCreateIndexService {
    pub fn new(defaults: IndexDefaults) -> Self {
        Self { defaults }
    }

    fn check_name(&self, current: &ClusterState, name: &str) -> StreamResult<()> {
        validate_index_or_alias_name(name, "index")?;
        if name.to_lowercase() != name {
            return Err(StreamError::InvalidName {
                kind: "index".to_string(),
                name: name.to_string(),
                reason: "must be lowercase".to_string(),
            });
        }
        match current.metadata().lookup_name(name) {
            None => Ok(()),
            Some(NameKind::Index) => Err(StreamError::IndexAlreadyExists {
                index: name.to_string(),
            }),
            Some(kind) => Err(StreamError::InvalidName {
                kind: "index".to_string(),
                name: name.to_string(),
                reason: format!("already exists as {kind}"),
            }),
        }
    }

    fn number_of_replicas(&self, settings: &Settings, node_count: usize) -> StreamResult<u32> {
        match settings.get(settings::AUTO_EXPAND_REPLICAS) {
            Some(range) => auto_expand_replicas(range, node_count),
            None => u32_setting(
                settings,
                settings::NUMBER_OF_REPLICAS,
                self.defaults.number_of_replicas,
            ),
        }
    }
}

impl IndexCreationService for MetadataCreateIndexService {
    fn create_index(
        &self,
        current: &ClusterState,
        request: CreateIndexRequest,
    ) -> StreamResult<ClusterState> {
        let name = request.index.as_str();
        self.check_name(current, name)?;

        let mut effective = request
            .template
            .as_ref()
            .map(ComposableTemplate::settings)
            .unwrap_or_default();
        effective.extend(request.settings.clone());

        let number_of_shards = u32_setting(
            &effective,
            settings::NUMBER_OF_SHARDS,
            self.defaults.number_of_shards,
        )?;
        if number_of_shards == 0 {
            return Err(StreamError::invalid_request(format!(
                "index [{name}] must have at least one shard"
            )));
        }
        let number_of_replicas = self.number_of_replicas(&effective, current.nodes().len())?;
        effective.insert(
            settings::NUMBER_OF_SHARDS.to_string(),
            number_of_shards.to_string(),
        );
        effective.insert(
            settings::NUMBER_OF_REPLICAS.to_string(),
            number_of_replicas.to_string(),
        );
        if request.system {
            effective.insert(settings::SYSTEM.to_string(), "true".to_string());
        }
        let hidden = bool_setting(&effective, settings::HIDDEN, false)?;
        let system = bool_setting(&effective, settings::SYSTEM, false)?;

        let mut mapping = request
            .template
            .as_ref()
            .and_then(|t| t.mappings().cloned());
        if request.data_stream.is_some() {
            let timestamp_field = request
                .template
                .as_ref()
                .and_then(|t| t.data_stream.as_ref())
                .map(|ds| ds.timestamp_field.clone())
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_FIELD.to_string());
            let mapping = mapping.get_or_insert_with(Mapping::default);
            add_timestamp_meta(name, mapping, &timestamp_field)?;
            validate_timestamp_field_mapping(name, mapping)?;
        }

        let index = IndexMetadata {
            index: IndexRef::new(
                name,
                index_uuid(current, name, request.creation_date_millis),
            ),
            settings: effective,
            number_of_shards,
            number_of_replicas,
            mapping,
            data_stream: request.data_stream.clone(),
            creation_date_millis: request.creation_date_millis,
            hidden,
            system,
        };

        tracing::info!(
            index = %index.index,
            cause = %request.cause,
            shards = number_of_shards,
            replicas = number_of_replicas,
            hidden,
            system,
            "creating index"
        );

        let routing = assign_shards(
            &IndexRoutingTable::new_unassigned(number_of_shards, number_of_replicas),
            current.nodes(),
        );
        let metadata = current.metadata().builder().put_index(index).build()?;
        Ok(current
            .builder()
            .metadata(metadata)
            .put_index_routing(name, routing)
            .build())
    }
}

/// Map the timestamp field as `date` unless mapped already, and enable the
/// `_data_stream_timestamp` meta field.
fn add_timestamp_meta(index: &str, mapping: &mut Mapping, field: &str) -> StreamResult<()> {
    let mapped = mapping
        .properties
        .entry(field.to_string())
        .or_insert_with(|| FieldMapping::new("date"));
    if !TIMESTAMP_FIELD_TYPES.contains(&mapped.field_type.as_str()) {
        return Err(StreamError::invalid_request(format!(
            "data stream timestamp field [{field}] of index [{index}] is of type [{}], but [date,date_nanos] is expected",
            mapped.field_type
        )));
    }
    mapping.data_stream_timestamp = Some(DataStreamTimestampMeta {
        enabled: true,
        path: field.to_string(),
    });
    Ok(())
}

/// Resolve `index.auto_expand_replicas` (`min-max`, where max may be `all`).
fn auto_expand_replicas(range: &str, node_count: usize) -> StreamResult<u32> {
    let invalid = || {
        StreamError::invalid_request(format!(
            "failed to parse [{}] from value [{range}]",
            settings::AUTO_EXPAND_REPLICAS
        ))
    };
    let (min, max) = range.split_once('-').ok_or_else(invalid)?;
    let min: u32 = min.parse().map_err(|_| invalid())?;
    let available = node_count.saturating_sub(1) as u32;
    let max = match max {
        "all" => available,
        other => other.parse().map_err(|_| invalid())?,
    };
    if min > max {
        return Err(invalid());
    }
    Ok(available.clamp(min, max))
}

/// Unique id for a new index instance.
fn index_uuid(state: &ClusterState, index: &str, creation_date_millis: u64) -> String {
    let mut hasher = XxHash64::with_seed(state.version());
    hasher.write(state.cluster_name().as_bytes());
    hasher.write(index.as_bytes());
    hasher.write(&creation_date_millis.to_le_bytes());
    format!("{:016x}", hasher.finish())
}
