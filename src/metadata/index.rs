//! Index metadata: identity, settings and mapping.

use crate::core::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index settings as flat `key = value` pairs.
pub type Settings = BTreeMap<String, String>;

/// Setting keys understood by this crate.
pub mod settings {
    pub const HIDDEN: &str = "index.hidden";
    pub const NUMBER_OF_SHARDS: &str = "index.number_of_shards";
    pub const NUMBER_OF_REPLICAS: &str = "index.number_of_replicas";
    pub const AUTO_EXPAND_REPLICAS: &str = "index.auto_expand_replicas";
    pub const WAIT_FOR_ACTIVE_SHARDS: &str = "index.write.wait_for_active_shards";
    pub const SYSTEM: &str = "index.system";
}

/// Settings applied to a backing index of a regular data stream.
pub fn hidden_index_settings() -> Settings {
    Settings::from([(settings::HIDDEN.to_string(), "true".to_string())])
}

/// Default settings applied to a backing index of a system data stream.
pub fn system_index_default_settings() -> Settings {
    Settings::from([
        (settings::HIDDEN.to_string(), "true".to_string()),
        (settings::AUTO_EXPAND_REPLICAS.to_string(), "0-1".to_string()),
    ])
}

/// Parse a boolean setting, defaulting when absent.
pub fn bool_setting(settings: &Settings, key: &str, default: bool) -> StreamResult<bool> {
    match settings.get(key).map(String::as_str) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(StreamError::invalid_request(format!(
            "failed to parse value [{other}] for setting [{key}], must be [true] or [false]"
        ))),
    }
}

/// Parse an unsigned integer setting, defaulting when absent.
pub fn u32_setting(settings: &Settings, key: &str, default: u32) -> StreamResult<u32> {
    match settings.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            StreamError::invalid_request(format!(
                "failed to parse value [{raw}] for setting [{key}]"
            ))
        }),
    }
}

/// Stable reference to an index: its name plus a unique instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexRef {
    pub name: String,
    pub uuid: String,
}

impl IndexRef {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
        }
    }
}

impl std::fmt::Display for IndexRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.name, self.uuid)
    }
}

/// Mapping of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field type, e.g. `date`, `keyword`.
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldMapping {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
        }
    }
}

/// The `_data_stream_timestamp` meta field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStreamTimestampMeta {
    pub enabled: bool,
    /// Path of the timestamp field.
    pub path: String,
}

/// Structural mapping of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Field mappings by full path.
    #[serde(default)]
    pub properties: BTreeMap<String, FieldMapping>,

    /// Timestamp meta field, present on data stream backing indices.
    #[serde(
        default,
        rename = "_data_stream_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_stream_timestamp: Option<DataStreamTimestampMeta>,
}

impl Mapping {
    /// Check whether the mapping declares `field` as the data stream timestamp.
    pub fn declares_timestamp_field(&self, field: &str) -> bool {
        self.data_stream_timestamp
            .as_ref()
            .is_some_and(|meta| meta.enabled && meta.path == field)
            && self.properties.contains_key(field)
    }
}

/// Field types accepted for a data stream timestamp.
pub const TIMESTAMP_FIELD_TYPES: &[&str] = &["date", "date_nanos"];

/// Sanity-check the timestamp meta field of a backing index mapping.
///
/// This runs after mappings have been merged; a failure means a mapping was
/// overwritten somewhere and is reported as an internal defect.
pub fn validate_timestamp_field_mapping(index: &str, mapping: &Mapping) -> StreamResult<()> {
    let violation = |message: String| StreamError::StructuralInvariant {
        index: index.to_string(),
        message,
    };

    let meta = mapping
        .data_stream_timestamp
        .as_ref()
        .ok_or_else(|| violation("[_data_stream_timestamp] meta field must exist".to_string()))?;
    if !meta.enabled {
        return Err(violation(
            "[_data_stream_timestamp] meta field has been disabled".to_string(),
        ));
    }
    let field = mapping.properties.get(&meta.path).ok_or_else(|| {
        violation(format!(
            "data stream timestamp field [{}] does not exist",
            meta.path
        ))
    })?;
    if !TIMESTAMP_FIELD_TYPES.contains(&field.field_type.as_str()) {
        return Err(violation(format!(
            "data stream timestamp field [{}] is of type [{}], but [date,date_nanos] is expected",
            meta.path, field.field_type
        )));
    }
    Ok(())
}

/// Metadata for a single index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Name and unique id.
    pub index: IndexRef,

    /// Effective settings.
    pub settings: Settings,

    /// Number of primary shards.
    pub number_of_shards: u32,

    /// Number of replicas per primary.
    pub number_of_replicas: u32,

    /// Structural mapping (if any).
    pub mapping: Option<Mapping>,

    /// Owning data stream, for backing indices.
    pub data_stream: Option<String>,

    /// Creation time in epoch milliseconds.
    pub creation_date_millis: u64,

    /// Hidden from wildcard expansion.
    pub hidden: bool,

    /// Owned by the system.
    pub system: bool,
}

impl IndexMetadata {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.index.name
    }

    /// Total number of shard copies (primaries and replicas).
    pub fn total_copies_per_shard(&self) -> u32 {
        self.number_of_replicas + 1
    }
}
