//! Lookup pipeline errors.
//!
//! Schema and cycle errors abort the current top-level call and surface to
//! the caller verbatim. A provider that finds nothing is a normal `None`
//! result, never an error.

use crate::config::ConfigError;
use crate::plugin::PluginError;
use std::io;
use std::path::PathBuf;
use strata_types::{KeyError, ValueError, ValueKind};
use thiserror::Error;

/// Errors surfaced by lookups and the machinery beneath them.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Value(#[from] ValueError),

    // ── interpolation ────────────────────────────────────────────────

    #[error("interpolation method syntax is not allowed in this context")]
    MethodNotAllowed,

    #[error("unknown interpolation method '{name}'")]
    UnknownMethod { name: String },

    #[error("an alias interpolation must be the entire string")]
    AliasNotEntireString,

    #[error("endless recursion detected when resolving '{key}'")]
    EndlessRecursion { key: String },

    // ── merging ──────────────────────────────────────────────────────

    #[error("unknown merge strategy '{name}'")]
    UnknownMergeStrategy { name: String },

    #[error("merge strategy 'unique' cannot merge maps")]
    UniqueOnMap,

    #[error("merge strategy 'hash' requires map values, got {actual}")]
    HashMergeKind { actual: ValueKind },

    // ── type coercion ────────────────────────────────────────────────

    #[error("unknown type '{name}' in convert_to")]
    UnknownConvertType { name: String },

    #[error("cannot convert {actual} to {target}")]
    ConvertFailed { actual: ValueKind, target: String },

    // ── providers & resources ────────────────────────────────────────

    #[error("failed to read data file '{path}': {source}")]
    ReadData {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse data file '{path}': {message}")]
    ParseData { path: PathBuf, message: String },

    #[error("data_hash function '{function}' did not return a map, got {actual}")]
    DataHashKind { function: String, actual: ValueKind },

    #[error("invalid glob pattern '{pattern}': {source}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to expand glob '{pattern}': {source}")]
    GlobWalk {
        pattern: String,
        #[source]
        source: glob::GlobError,
    },

    #[error("mapped_paths variable '{var}' must be an array of strings")]
    MappedPathsKind { var: String },

    #[error("lookup was cancelled")]
    Cancelled,
}

impl LookupError {
    /// Creates a read error for a data file.
    pub fn read_data(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadData {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error for a data file.
    pub fn parse_data(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ParseData {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_display() {
        let err = LookupError::EndlessRecursion { key: "a".into() };
        assert!(err.to_string().contains("endless recursion"));
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn config_error_is_transparent() {
        let err: LookupError = ConfigError::DuplicateName { name: "Common".into() }.into();
        assert!(err.to_string().contains("Common"));
    }
}
