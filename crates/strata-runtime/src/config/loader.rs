//! Hierarchy configuration loading.
//!
//! The loader turns a parsed YAML document into a [`Config`]. Schema
//! violations (unknown keys, reserved options, conflicting specs) are
//! reported eagerly; interpolation and location expansion happen later,
//! during entry resolution.

use crate::config::entry::{Entry, Function, FunctionKind};
use crate::config::location::Location;
use crate::config::ConfigError;
use crate::yaml;
use std::path::{Path, PathBuf};
use strata_types::Value;
use tracing::debug;

/// Option keys an entry may not use because the engine owns them.
pub const RESERVED_OPTION_KEYS: &[&str] = &[
    "path",
    "paths",
    "glob",
    "globs",
    "uri",
    "uris",
    "mapped_paths",
    "data_hash",
    "data_dig",
    "lookup_key",
    "datadir",
];

const LOCATION_KEYS: &[&str] = &[
    "path",
    "paths",
    "glob",
    "globs",
    "uri",
    "uris",
    "mapped_paths",
];

const TOP_LEVEL_KEYS: &[&str] = &["version", "defaults", "hierarchy", "default_hierarchy"];

/// A parsed (but not yet resolved) hierarchy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    path: Option<PathBuf>,
    defaults: Entry,
    hierarchy: Vec<Entry>,
    default_hierarchy: Vec<Entry>,
}

impl Config {
    /// Loads the configuration at `config_path`. A missing file yields the
    /// built-in default configuration rooted at the file's directory.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using built-in default hierarchy");
            return Ok(Self::default_config(root));
        }

        let text =
            std::fs::read_to_string(config_path).map_err(|source| ConfigError::ReadFile {
                path: config_path.to_path_buf(),
                source,
            })?;
        let doc = yaml::parse_str(&text).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_document(&doc, config_path)
    }

    /// Builds a configuration from an already parsed document.
    pub fn from_document(doc: &Value, config_path: &Path) -> Result<Self, ConfigError> {
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let hash = doc.as_map().ok_or_else(|| ConfigError::NotAMap {
            path: config_path.to_path_buf(),
        })?;

        for key in hash.keys() {
            if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownKey {
                    key: key.clone(),
                    path: config_path.to_path_buf(),
                });
            }
        }

        if let Some(version) = hash.get("version") {
            let version = version.as_int().unwrap_or(-1);
            if version != 5 {
                return Err(ConfigError::UnsupportedVersion { version });
            }
        }

        let defaults = match hash.get("defaults") {
            Some(dv) => create_entry("defaults", dv)?,
            None => default_defaults(),
        };

        let hierarchy = match hash.get("hierarchy") {
            Some(hv) => create_hierarchy(hv)?,
            None => default_hierarchy(),
        };

        let default_hierarchy = match hash.get("default_hierarchy") {
            Some(hv) => create_hierarchy(hv)?,
            None => Vec::new(),
        };

        Ok(Self {
            root,
            path: Some(config_path.to_path_buf()),
            defaults,
            hierarchy,
            default_hierarchy,
        })
    }

    fn default_config(root: PathBuf) -> Self {
        Self {
            root,
            path: None,
            defaults: default_defaults(),
            hierarchy: default_hierarchy(),
            default_hierarchy: Vec::new(),
        }
    }

    /// The absolute directory data dirs resolve against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The config file this was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn defaults(&self) -> &Entry {
        &self.defaults
    }

    #[must_use]
    pub fn hierarchy(&self) -> &[Entry] {
        &self.hierarchy
    }

    #[must_use]
    pub fn default_hierarchy(&self) -> &[Entry] {
        &self.default_hierarchy
    }
}

fn default_defaults() -> Entry {
    let mut e = Entry::new("defaults");
    e.set_data_dir("data");
    e.set_function(Function::default_data_hash());
    e
}

fn default_hierarchy() -> Vec<Entry> {
    // Without a config file: <root>/data.yaml, then <root>/data/common.yaml.
    let mut root = Entry::new("Root");
    root.set_data_dir(".");
    root.set_locations(vec![Location::path("data.yaml")]);
    let mut common = Entry::new("Common");
    common.set_locations(vec![Location::path("common.yaml")]);
    vec![root, common]
}

fn create_hierarchy(value: &Value) -> Result<Vec<Entry>, ConfigError> {
    let items = value.as_array().unwrap_or_default();
    let mut entries = Vec::with_capacity(items.len());
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    for item in items {
        let name = item
            .as_map()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateName { name });
        }
        entries.push(create_entry(&name, item)?);
    }
    Ok(entries)
}

fn create_entry(name: &str, value: &Value) -> Result<Entry, ConfigError> {
    let hash = value
        .as_map()
        .ok_or_else(|| ConfigError::invalid_entry("entry", name, "must be a map"))?;
    let mut entry = Entry::new(name);

    // First pass: options and the data provider function.
    for (key, v) in hash {
        if key == "options" {
            let options = v
                .as_map()
                .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a map"))?;
            for opt_key in options.keys() {
                if RESERVED_OPTION_KEYS.contains(&opt_key.as_str()) {
                    return Err(ConfigError::OptionReservedByHiera {
                        key: opt_key.clone(),
                        name: name.to_owned(),
                    });
                }
            }
            entry.set_options(options.clone());
        } else if let Some(kind) = FunctionKind::from_key(key) {
            if entry.function().is_some() {
                return Err(ConfigError::MultipleDataProviderFunctions {
                    name: name.to_owned(),
                });
            }
            let fn_name = v
                .as_str()
                .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a string"))?;
            entry.set_function(Function::new(kind, fn_name));
        }
    }

    // Second pass: data dir and locations.
    for (key, v) in hash {
        match key.as_str() {
            "name" | "options" | "data_hash" | "data_dig" | "lookup_key" => {}
            "datadir" => {
                let dir = v
                    .as_str()
                    .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a string"))?;
                entry.set_data_dir(dir);
            }
            "plugin_dir" => {
                let dir = v
                    .as_str()
                    .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a string"))?;
                entry.set_plugin_dir(dir);
            }
            "plugin_file" => {
                let file = v
                    .as_str()
                    .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a string"))?;
                entry.set_plugin_file(file);
            }
            k if LOCATION_KEYS.contains(&k) => {
                if entry.locations().is_some() {
                    return Err(ConfigError::MultipleLocationSpecs {
                        name: name.to_owned(),
                    });
                }
                entry.set_locations(create_locations(name, k, v)?);
            }
            other => {
                return Err(ConfigError::UnknownEntryKey {
                    key: other.to_owned(),
                    name: name.to_owned(),
                });
            }
        }
    }

    Ok(entry)
}

fn create_locations(name: &str, key: &str, value: &Value) -> Result<Vec<Location>, ConfigError> {
    let one_string = |v: &Value| -> Result<String, ConfigError> {
        Ok(v.as_str()
            .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be a string"))?
            .to_owned())
    };
    let many_strings = |v: &Value| -> Result<Vec<String>, ConfigError> {
        v.as_array()
            .ok_or_else(|| ConfigError::invalid_entry(key, name, "must be an array"))?
            .iter()
            .map(one_string)
            .collect()
    };

    Ok(match key {
        "path" => vec![Location::path(one_string(value)?)],
        "paths" => many_strings(value)?.into_iter().map(Location::path).collect(),
        "glob" => vec![Location::glob(one_string(value)?)],
        "globs" => many_strings(value)?.into_iter().map(Location::glob).collect(),
        "uri" => vec![Location::uri(one_string(value)?)],
        "uris" => many_strings(value)?.into_iter().map(Location::uri).collect(),
        "mapped_paths" => {
            let parts = many_strings(value)?;
            if parts.len() != 3 {
                return Err(ConfigError::invalid_entry(
                    key,
                    name,
                    "must be an array of three strings",
                ));
            }
            vec![Location::mapped_paths(
                parts[0].clone(),
                parts[1].clone(),
                parts[2].clone(),
            )]
        }
        _ => Vec::new(),
    })
}
