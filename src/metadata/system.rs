//! System data stream registry.
//!
//! System data streams are owned by the cluster itself. They carry their own
//! template instead of going through template resolution, and their backing
//! indices get system default settings.

use crate::core::error::{StreamError, StreamResult};
use crate::metadata::template::ComposableTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes a system-owned data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDataStreamDescriptor {
    /// Data stream name.
    pub name: String,

    /// Human-readable purpose.
    #[serde(default)]
    pub description: String,

    /// Template used to create the data stream.
    pub template: ComposableTemplate,
}

impl SystemDataStreamDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: ComposableTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template,
        }
    }
}

/// Registered system data streams.
#[derive(Debug, Clone, Default)]
pub struct SystemDataStreams {
    descriptors: BTreeMap<String, SystemDataStreamDescriptor>,
}

impl SystemDataStreams {
    /// Create a registry from descriptors. Later duplicates replace earlier ones.
    pub fn new(descriptors: impl IntoIterator<Item = SystemDataStreamDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    /// Check whether `name` is a registered system data stream.
    pub fn is_system_data_stream(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Descriptor for `name`.
    pub fn get(&self, name: &str) -> Option<&SystemDataStreamDescriptor> {
        self.descriptors.get(name)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Check that a request's descriptor agrees with the registry.
    ///
    /// A registered name must come with a descriptor and an unregistered one
    /// must not. A mismatch is a caller defect, not a user error.
    pub fn check_descriptor(
        &self,
        name: &str,
        descriptor: Option<&SystemDataStreamDescriptor>,
    ) -> StreamResult<()> {
        match (self.is_system_data_stream(name), descriptor) {
            (true, None) => Err(StreamError::internal(format!(
                "data_stream [{name}] is system but no system descriptor was provided"
            ))),
            (false, Some(_)) => Err(StreamError::internal(format!(
                "data_stream [{name}] has a system descriptor but is not a registered system data stream"
            ))),
            _ => Ok(()),
        }
    }
}
