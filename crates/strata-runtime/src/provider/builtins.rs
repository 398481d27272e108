//! Built-in data functions and the resolved function dispatchers.
//!
//! Resolution order for an entry's function name: built-ins, then the
//! session's registered function table, then a plugin executable found via
//! the entry's `plugin_dir`/`plugin_file`.

use crate::config::{Entry, FunctionKind};
use crate::error::LookupError;
use crate::plugin::{Plugin, PluginError};
use crate::provider::{DataDigFunc, DataHashFunc, LookupKeyFunc, ProviderContext};
use crate::session::Session;
use crate::yaml;
use std::path::Path;
use std::sync::Arc;
use strata_types::{Map, Segment, Value};

/// A resolved `data_hash` function.
#[derive(Clone)]
pub enum DataHashFn {
    YamlData,
    JsonData,
    Registered(DataHashFunc),
    Plugin { plugin: Arc<Plugin>, name: String },
}

/// A resolved `data_dig` function.
#[derive(Clone)]
pub enum DataDigFn {
    Registered(DataDigFunc),
    Plugin { plugin: Arc<Plugin>, name: String },
}

/// A resolved `lookup_key` function.
#[derive(Clone)]
pub enum LookupKeyFn {
    ConfigLookupKey,
    ScopeLookupKey,
    Environment,
    Registered(LookupKeyFunc),
    Plugin { plugin: Arc<Plugin>, name: String },
}

impl DataHashFn {
    pub(crate) fn resolve(entry: &Entry, session: &Session) -> Result<Self, LookupError> {
        let name = function_name(entry);
        match name {
            "yaml_data" => Ok(Self::YamlData),
            "json_data" => Ok(Self::JsonData),
            _ => {
                if let Some(f) = session.functions().data_hash(name) {
                    return Ok(Self::Registered(f));
                }
                let plugin = load_plugin(entry, session, FunctionKind::DataHash, name)?;
                Ok(Self::Plugin {
                    plugin,
                    name: name.to_owned(),
                })
            }
        }
    }

    pub(crate) fn call(&self, ctx: &mut ProviderContext<'_, '_>) -> Result<Map, LookupError> {
        match self {
            Self::YamlData => data_file(ctx, |path, text| {
                yaml::parse_str(text).map_err(|e| LookupError::parse_data(path, e.to_string()))
            }),
            Self::JsonData => data_file(ctx, |path, text| {
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(text).map_err(|e| LookupError::parse_data(path, e.to_string()))
            }),
            // Registered and plugin functions fall back to an empty hash
            // when they return something other than a map.
            Self::Registered(f) => Ok(match f(ctx)? {
                Value::Map(m) => m,
                _ => Map::new(),
            }),
            Self::Plugin { plugin, name } => {
                Ok(match plugin.call(FunctionKind::DataHash, name, None, ctx.options())? {
                    Some(Value::Map(m)) => m,
                    _ => Map::new(),
                })
            }
        }
    }
}

impl DataDigFn {
    pub(crate) fn resolve(entry: &Entry, session: &Session) -> Result<Self, LookupError> {
        let name = function_name(entry);
        if let Some(f) = session.functions().data_dig(name) {
            return Ok(Self::Registered(f));
        }
        let plugin = load_plugin(entry, session, FunctionKind::DataDig, name)?;
        Ok(Self::Plugin {
            plugin,
            name: name.to_owned(),
        })
    }

    pub(crate) fn call(
        &self,
        ctx: &mut ProviderContext<'_, '_>,
        parts: &[Segment],
    ) -> Result<Option<Value>, LookupError> {
        match self {
            Self::Registered(f) => f(ctx, parts),
            Self::Plugin { plugin, name } => {
                let key: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        Segment::Name(n) => Value::from(n.as_str()),
                        Segment::Index(i) => Value::Int(*i as i64),
                    })
                    .collect();
                let encoded = serde_json::to_string(&Value::Array(key)).unwrap_or_default();
                Ok(plugin.call(FunctionKind::DataDig, name, Some(encoded), ctx.options())?)
            }
        }
    }
}

impl LookupKeyFn {
    pub(crate) fn resolve(entry: &Entry, session: &Session) -> Result<Self, LookupError> {
        let name = function_name(entry);
        match name {
            "config_lookup_key" => Ok(Self::ConfigLookupKey),
            "scope_lookup_key" => Ok(Self::ScopeLookupKey),
            "environment" => Ok(Self::Environment),
            _ => {
                if let Some(f) = session.functions().lookup_key(name) {
                    return Ok(Self::Registered(f));
                }
                let plugin = load_plugin(entry, session, FunctionKind::LookupKey, name)?;
                Ok(Self::Plugin {
                    plugin,
                    name: name.to_owned(),
                })
            }
        }
    }

    pub(crate) fn call(
        &self,
        ctx: &mut ProviderContext<'_, '_>,
        root: &str,
    ) -> Result<Option<Value>, LookupError> {
        match self {
            Self::ConfigLookupKey => Ok(ctx.session_options().get(root).cloned()),
            Self::ScopeLookupKey => Ok(ctx.scope().get(root).cloned()),
            Self::Environment => Ok(std::env::var(root).ok().map(Value::from)),
            Self::Registered(f) => f(ctx, root),
            Self::Plugin { plugin, name } => Ok(plugin.call(
                FunctionKind::LookupKey,
                name,
                Some(root.to_owned()),
                ctx.options(),
            )?),
        }
    }
}

/// Chains `lookup_key` functions: each is tried in order, a not-found
/// continues the chain, any found value (explicit null included)
/// terminates it.
#[must_use]
pub fn lookup_key_chain(functions: Vec<LookupKeyFunc>) -> LookupKeyFunc {
    Arc::new(move |ctx, key| {
        for f in &functions {
            if let Some(value) = f(ctx, key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    })
}

fn function_name(entry: &Entry) -> &str {
    entry.function().map(|f| f.name()).unwrap_or_default()
}

fn load_plugin(
    entry: &Entry,
    session: &Session,
    kind: FunctionKind,
    name: &str,
) -> Result<Arc<Plugin>, LookupError> {
    let path = entry.plugin_path();
    let plugin = session.plugins().start(&path)?;
    if !plugin.exports(kind, name) {
        return Err(PluginError::MissingFunction {
            path,
            kind: kind.as_str(),
            name: name.to_owned(),
        }
        .into());
    }
    Ok(plugin)
}

/// Reads and parses the file named by the `path` option. An absent or
/// empty path, an empty file and a null document all yield an empty hash.
fn data_file(
    ctx: &ProviderContext<'_, '_>,
    parse: impl Fn(&Path, &str) -> Result<Value, LookupError>,
) -> Result<Map, LookupError> {
    let Some(path) = ctx
        .option("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(Path::new)
    else {
        return Ok(Map::new());
    };
    let text =
        std::fs::read_to_string(path).map_err(|e| LookupError::read_data(path, e))?;
    match parse(path, &text)? {
        Value::Null => Ok(Map::new()),
        Value::Map(m) => Ok(m),
        other => Err(LookupError::parse_data(
            path,
            format!("the document root must be a map, got {}", other.kind()),
        )),
    }
}
