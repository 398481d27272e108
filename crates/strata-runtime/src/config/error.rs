//! Configuration schema errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a hierarchy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("the configuration at '{path}' must be a map")]
    NotAMap { path: PathBuf },

    #[error("unknown top-level key '{key}' in '{path}'")]
    UnknownKey { key: String, path: PathBuf },

    #[error("unsupported configuration version {version}, expected 5")]
    UnsupportedVersion { version: i64 },

    #[error("hierarchy entry '{name}': option key '{key}' is reserved")]
    OptionReservedByHiera { key: String, name: String },

    #[error("hierarchy entry '{name}' declares more than one data provider function")]
    MultipleDataProviderFunctions { name: String },

    #[error("hierarchy entry '{name}' declares more than one location kind")]
    MultipleLocationSpecs { name: String },

    #[error("hierarchy entry '{name}' has no data provider function")]
    MissingDataProviderFunction { name: String },

    #[error("hierarchy name '{name}' is defined more than once")]
    DuplicateName { name: String },

    #[error("unknown key '{key}' in hierarchy entry '{name}'")]
    UnknownEntryKey { key: String, name: String },

    #[error("hierarchy entry '{name}': '{key}' {message}")]
    InvalidEntryValue {
        key: String,
        name: String,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid_entry(
        key: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidEntryValue {
            key: key.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}
