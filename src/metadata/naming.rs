//! Naming rules shared by indices, data streams and aliases.
//!
//! All three live in one namespace, so the general rules are identical.
//! Data streams add two rules on top: names must be lowercase and must not
//! start with the backing index prefix.

use crate::core::error::{StreamError, StreamResult};
use crate::core::time::format_date;

/// Prefix of every auto-generated backing index name.
pub const BACKING_INDEX_PREFIX: &str = ".ds-";

/// Maximum name length in bytes.
pub const MAX_NAME_BYTES: usize = 255;

/// Characters that may not appear anywhere in a name.
pub const INVALID_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// Validate a name against the rules shared by indices, data streams and aliases.
///
/// `kind` prefixes the error message, e.g. `data_stream` or `index`.
pub fn validate_index_or_alias_name(name: &str, kind: &str) -> StreamResult<()> {
    let invalid = |reason: String| StreamError::InvalidName {
        kind: kind.to_string(),
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty".to_string()));
    }
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(invalid(format!(
            "must not contain the following characters {:?}, found '{}'",
            INVALID_CHARS, c
        )));
    }
    if name.starts_with('_') || name.starts_with('-') || name.starts_with('+') {
        return Err(invalid("must not start with '_', '-', or '+'".to_string()));
    }
    if name == "." || name == ".." {
        return Err(invalid("must not be '.' or '..'".to_string()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(invalid(format!(
            "name is too long, ({} > {})",
            name.len(),
            MAX_NAME_BYTES
        )));
    }
    Ok(())
}

/// Validate a data stream name.
///
/// Applies the shared rules, then the lowercase and reserved-prefix rules,
/// in that order.
pub fn validate_data_stream_name(name: &str) -> StreamResult<()> {
    validate_index_or_alias_name(name, "data_stream")?;

    if name.to_lowercase() != name {
        return Err(StreamError::invalid_name(name, "must be lowercase"));
    }
    if name.starts_with(BACKING_INDEX_PREFIX) {
        return Err(StreamError::invalid_name(
            name,
            format!("must not start with '{}'", BACKING_INDEX_PREFIX),
        ));
    }
    Ok(())
}

/// Name of the backing index for a data stream generation.
///
/// Format: `.ds-<data-stream>-<yyyy.MM.dd>-<generation, six digits>`.
pub fn default_backing_index_name(data_stream: &str, generation: u64, epoch_millis: u64) -> String {
    format!(
        "{}{}-{}-{:06}",
        BACKING_INDEX_PREFIX,
        data_stream,
        format_date(epoch_millis),
        generation
    )
}
