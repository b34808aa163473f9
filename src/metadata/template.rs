//! Composable index templates and template resolution.
//!
//! A template matches names through wildcard `index_patterns`. When several
//! templates match, the one with the highest `priority` wins; ties go to the
//! template whose name sorts first. Only templates with a `data_stream`
//! section may create data streams.

use crate::core::error::{StreamError, StreamResult};
use crate::metadata::data_stream::DEFAULT_TIMESTAMP_FIELD;
use crate::metadata::index::{Mapping, Settings};
use crate::metadata::naming::validate_index_or_alias_name;
use crate::metadata::state::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alias declared by a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDefinition {
    /// Filter expression applied to reads through the alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Whether the alias should write to the new data stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_write_index: Option<bool>,
}

/// Settings, mappings and aliases applied to matching indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBody {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Mapping>,

    /// Aliases by name.
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasDefinition>,
}

/// Marks a template as creating data streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStreamTemplate {
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub allow_custom_routing: bool,
}

impl Default for DataStreamTemplate {
    fn default() -> Self {
        Self {
            timestamp_field: default_timestamp_field(),
            hidden: false,
            allow_custom_routing: false,
        }
    }
}

fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.to_string()
}

/// A composable index template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposableTemplate {
    /// Wildcard patterns (`*` only) matched against names.
    #[serde(default)]
    pub index_patterns: Vec<String>,

    /// Higher priority wins when several templates match.
    #[serde(default)]
    pub priority: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateBody>,

    /// Present when the template creates data streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_stream: Option<DataStreamTemplate>,

    /// User metadata copied onto created data streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl ComposableTemplate {
    /// Template that creates data streams for the given patterns.
    pub fn for_data_streams(patterns: &[&str], timestamp_field: &str) -> Self {
        Self {
            index_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            data_stream: Some(DataStreamTemplate {
                timestamp_field: timestamp_field.to_string(),
                ..DataStreamTemplate::default()
            }),
            ..Self::default()
        }
    }

    /// Check whether any pattern matches `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.index_patterns.iter().any(|p| simple_match(p, name))
    }

    /// Check whether the template matches everything.
    pub fn is_global(&self) -> bool {
        self.index_patterns.iter().any(|p| p == "*")
    }

    /// Settings declared by the template body.
    pub fn settings(&self) -> Settings {
        self.template
            .as_ref()
            .map(|t| t.settings.clone())
            .unwrap_or_default()
    }

    /// Mapping declared by the template body.
    pub fn mappings(&self) -> Option<&Mapping> {
        self.template.as_ref().and_then(|t| t.mappings.as_ref())
    }

    /// Aliases declared by the template body.
    pub fn aliases(&self) -> impl Iterator<Item = (&String, &AliasDefinition)> {
        self.template.iter().flat_map(|t| t.aliases.iter())
    }
}

/// Wildcard match supporting any number of `*`.
pub fn simple_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !name.starts_with(first) || name.len() < first.len() + last.len() {
        return false;
    }
    let mut rest = &name[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Find the name of the best matching template for `name`.
///
/// Global (`*`) templates are skipped when `hidden` is true.
pub fn find_template(metadata: &Metadata, name: &str, hidden: bool) -> Option<String> {
    let mut best: Option<(&String, &ComposableTemplate)> = None;
    for (template_name, template) in metadata.templates() {
        if !template.matches(name) || (hidden && template.is_global()) {
            continue;
        }
        match best {
            Some((_, current)) if current.priority >= template.priority => {}
            _ => best = Some((template_name, template)),
        }
    }
    best.map(|(template_name, _)| template_name.clone())
}

/// Resolve the template a data stream named `name` is created from.
pub fn lookup_template_for_data_stream(
    name: &str,
    metadata: &Metadata,
) -> StreamResult<ComposableTemplate> {
    let template_name = find_template(metadata, name, false).ok_or_else(|| {
        StreamError::template_resolution(
            name,
            format!("no matching index template found for data stream [{name}]"),
        )
    })?;
    let template = metadata
        .template(&template_name)
        .ok_or_else(|| StreamError::internal(format!("template [{template_name}] vanished")))?;
    if template.data_stream.is_none() {
        return Err(StreamError::template_resolution(
            name,
            format!(
                "matching index template [{template_name}] for data stream [{name}] has no data stream template"
            ),
        ));
    }
    Ok(template.clone())
}

/// An alias resolved from a template, ready to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAlias {
    pub name: String,
    pub filter: Option<String>,
    pub is_write_index: Option<bool>,
}

/// Resolve the aliases a template attaches, validating each name.
pub fn resolve_aliases(template: &ComposableTemplate) -> StreamResult<Vec<ResolvedAlias>> {
    template
        .aliases()
        .map(|(name, definition)| {
            validate_index_or_alias_name(name, "alias")?;
            Ok(ResolvedAlias {
                name: name.clone(),
                filter: definition.filter.clone(),
                is_write_index: definition.is_write_index,
            })
        })
        .collect()
}

/// Resolves the creation template for a data stream.
pub trait TemplateResolver: Send + Sync {
    /// Return the template for `name`, or a `TemplateResolution` error.
    fn resolve(&self, name: &str, metadata: &Metadata) -> StreamResult<ComposableTemplate>;
}

/// Resolves templates registered in cluster metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataTemplateResolver;

impl TemplateResolver for MetadataTemplateResolver {
    fn resolve(&self, name: &str, metadata: &Metadata) -> StreamResult<ComposableTemplate> {
        lookup_template_for_data_stream(name, metadata)
    }
}
