//! Data streams and data stream aliases.

use crate::metadata::index::IndexRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the field used to order documents of a data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampField {
    pub name: String,
}

impl TimestampField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TimestampField {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_FIELD)
    }
}

/// Timestamp field used when a template does not name one.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

bitflags::bitflags! {
    /// Flags describing a data stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DataStreamFlags: u32 {
        /// Hidden from wildcard expansion.
        const HIDDEN = 0b0000_0001;
        /// Replicated from a remote cluster; write target is read-only.
        const REPLICATED = 0b0000_0010;
        /// Owned by the system.
        const SYSTEM = 0b0000_0100;
        /// Writes may supply their own routing.
        const ALLOW_CUSTOM_ROUTING = 0b0000_1000;
    }
}

impl Default for DataStreamFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A data stream: a named, append-only sequence of backing indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStream {
    /// Data stream name.
    pub name: String,

    /// Ordering field.
    pub timestamp_field: TimestampField,

    /// Backing indices, oldest first. The last one is the write index.
    pub indices: Vec<IndexRef>,

    /// Generation counter, starts at 1 and increments on rollover.
    pub generation: u64,

    /// User metadata copied from the template.
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,

    /// Flags.
    pub flags: DataStreamFlags,
}

impl DataStream {
    /// Create a data stream. `indices` must not be empty.
    pub fn new(
        name: impl Into<String>,
        timestamp_field: TimestampField,
        indices: Vec<IndexRef>,
        generation: u64,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
        flags: DataStreamFlags,
    ) -> Self {
        debug_assert!(!indices.is_empty(), "data stream must have a backing index");
        Self {
            name: name.into(),
            timestamp_field,
            indices,
            generation,
            metadata,
            flags,
        }
    }

    /// The index currently receiving writes, `None` if `indices` is empty.
    pub fn write_index(&self) -> Option<&IndexRef> {
        self.indices.last()
    }

    /// Check whether `index` backs this data stream.
    pub fn contains_index(&self, index: &str) -> bool {
        self.indices.iter().any(|i| i.name == index)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(DataStreamFlags::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.flags.contains(DataStreamFlags::SYSTEM)
    }

    pub fn is_replicated(&self) -> bool {
        self.flags.contains(DataStreamFlags::REPLICATED)
    }

    pub fn allows_custom_routing(&self) -> bool {
        self.flags.contains(DataStreamFlags::ALLOW_CUSTOM_ROUTING)
    }
}

/// An alias pointing at one or more data streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStreamAlias {
    /// Alias name.
    pub name: String,

    /// Data streams the alias resolves to.
    pub data_streams: BTreeSet<String>,

    /// Data stream that receives writes through this alias.
    pub write_data_stream: Option<String>,

    /// Filter expression applied to reads through this alias.
    pub filter: Option<String>,
}

impl DataStreamAlias {
    /// Create an alias for a single data stream.
    pub fn new(
        name: impl Into<String>,
        data_stream: impl Into<String>,
        is_write: bool,
        filter: Option<String>,
    ) -> Self {
        let data_stream = data_stream.into();
        Self {
            name: name.into(),
            write_data_stream: is_write.then(|| data_stream.clone()),
            data_streams: BTreeSet::from([data_stream]),
            filter,
        }
    }

    /// Return a copy of this alias that also points at `data_stream`.
    ///
    /// A write flag moves the write target to `data_stream`; a cleared write
    /// flag only unsets it if `data_stream` was the write target. A supplied
    /// filter replaces the existing one.
    pub fn with_data_stream(
        &self,
        data_stream: &str,
        is_write: Option<bool>,
        filter: Option<String>,
    ) -> Self {
        let mut updated = self.clone();
        updated.data_streams.insert(data_stream.to_string());
        match is_write {
            Some(true) => updated.write_data_stream = Some(data_stream.to_string()),
            Some(false) if updated.write_data_stream.as_deref() == Some(data_stream) => {
                updated.write_data_stream = None;
            }
            _ => {}
        }
        if filter.is_some() {
            updated.filter = filter;
        }
        updated
    }

    /// Check whether `data_stream` is the write target of this alias.
    pub fn is_write_data_stream(&self, data_stream: &str) -> bool {
        self.write_data_stream.as_deref() == Some(data_stream)
    }
}
