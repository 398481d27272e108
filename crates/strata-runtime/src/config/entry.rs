//! Hierarchy entries.

use crate::config::location::Location;
use crate::config::ConfigError;
use crate::error::LookupError;
use crate::session::Invocation;
use std::path::{Path, PathBuf};
use strata_types::{Map, Value};

/// The three shapes a data function can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    DataHash,
    DataDig,
    LookupKey,
}

impl FunctionKind {
    /// The config key / RPC path segment for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataHash => "data_hash",
            Self::DataDig => "data_dig",
            Self::LookupKey => "lookup_key",
        }
    }

    /// Recognizes a config key naming a function kind.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "data_hash" => Some(Self::DataHash),
            "data_dig" => Some(Self::DataDig),
            "lookup_key" => Some(Self::LookupKey),
            _ => None,
        }
    }
}

/// A data function reference: a kind plus a function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    kind: FunctionKind,
    name: String,
}

impl Function {
    pub fn new(kind: FunctionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// The function every hierarchy falls back to.
    #[must_use]
    pub fn default_data_hash() -> Self {
        Self::new(FunctionKind::DataHash, "yaml_data")
    }

    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One element of the hierarchy.
///
/// Parsed entries keep exactly what the document said; [`Entry::resolve`]
/// produces a copy with defaults inherited, strings interpolated and
/// locations expanded against the data root.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    name: String,
    data_dir: Option<String>,
    function: Option<Function>,
    options: Option<Map>,
    locations: Option<Vec<Location>>,
    plugin_dir: Option<String>,
    plugin_file: Option<String>,
}

impl Entry {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_dir: None,
            function: None,
            options: None,
            locations: None,
            plugin_dir: None,
            plugin_file: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_dir(&self) -> Option<&str> {
        self.data_dir.as_deref()
    }

    #[must_use]
    pub fn function(&self) -> Option<&Function> {
        self.function.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> Option<&Map> {
        self.options.as_ref()
    }

    #[must_use]
    pub fn locations(&self) -> Option<&[Location]> {
        self.locations.as_deref()
    }

    pub(crate) fn set_data_dir(&mut self, dir: impl Into<String>) {
        self.data_dir = Some(dir.into());
    }

    pub(crate) fn set_function(&mut self, function: Function) {
        self.function = Some(function);
    }

    pub(crate) fn set_options(&mut self, options: Map) {
        self.options = Some(options);
    }

    pub(crate) fn set_locations(&mut self, locations: Vec<Location>) {
        self.locations = Some(locations);
    }

    pub(crate) fn set_plugin_dir(&mut self, dir: impl Into<String>) {
        self.plugin_dir = Some(dir.into());
    }

    pub(crate) fn set_plugin_file(&mut self, file: impl Into<String>) {
        self.plugin_file = Some(file.into());
    }

    /// The absolute path of the plugin executable backing this entry's
    /// function. Only meaningful after [`Entry::resolve`].
    #[must_use]
    pub fn plugin_path(&self) -> PathBuf {
        let name = self
            .function
            .as_ref()
            .map(Function::name)
            .unwrap_or_default();
        let file = match &self.plugin_file {
            Some(f) => f.clone(),
            None => format!("{name}{}", std::env::consts::EXE_SUFFIX),
        };
        let file = Path::new(&file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            let dir = self.plugin_dir.as_deref().unwrap_or_default();
            Path::new(dir).join(file)
        }
    }

    /// Returns a resolved copy: function and data dir inherited from
    /// `defaults` or defaulted, interpolations expanded (methods are not
    /// allowed here), and locations resolved against the data root.
    pub fn resolve(
        &self,
        invocation: &mut Invocation<'_>,
        defaults: Option<&Entry>,
        config_root: &Path,
    ) -> Result<Entry, LookupError> {
        let mut resolved = self.clone();

        resolved.function = Some(match &self.function {
            None => match defaults {
                None => Function::default_data_hash(),
                Some(d) => d.function.clone().ok_or_else(|| {
                    ConfigError::MissingDataProviderFunction {
                        name: self.name.clone(),
                    }
                })?,
            },
            Some(f) => Function::new(f.kind, invocation.interpolate_string(&f.name, false)?),
        });

        resolved.data_dir = Some(match &self.data_dir {
            None => defaults
                .and_then(|d| d.data_dir.clone())
                .unwrap_or_else(|| "data".to_owned()),
            Some(d) => invocation.interpolate_string(d, false)?,
        });

        resolved.options = match &self.options {
            None => defaults.and_then(|d| d.options.clone()),
            Some(o) => {
                let interpolated = invocation.interpolate(&Value::Map(o.clone()), false)?;
                Some(interpolated.expect_map()?.clone())
            }
        };

        resolved.plugin_dir = Some(match &self.plugin_dir {
            Some(d) => {
                let d = invocation.interpolate_string(d, false)?;
                let p = Path::new(&d);
                if p.is_absolute() {
                    d
                } else {
                    config_root.join(p).display().to_string()
                }
            }
            None => config_root.join("plugin").display().to_string(),
        });

        let data_dir = resolved.data_dir.as_deref().unwrap_or("data");
        let data_root = if Path::new(data_dir).is_absolute() {
            PathBuf::from(data_dir)
        } else {
            config_root.join(data_dir)
        };

        if let Some(locations) = &self.locations {
            let mut expanded = Vec::with_capacity(locations.len());
            for location in locations {
                expanded.extend(location.resolve(invocation, &data_root)?);
            }
            resolved.locations = Some(expanded);
        }

        Ok(resolved)
    }
}
