//! Data providers.
//!
//! A provider binds a resolved hierarchy entry to its callable data
//! function. Three shapes exist, selected by the entry's function kind:
//!
//! | Kind | Function receives | Caching |
//! |---|---|---|
//! | `data_hash` | the location | whole hash per location |
//! | `data_dig` | the key's parts | none (the function owns its cost) |
//! | `lookup_key` | the root key | per `(location, root)`, misses included |
//!
//! The function itself resolves lazily on first use: built-ins first, then
//! session-registered functions, then plugins.

mod builtins;
mod data_dig;
mod data_hash;
mod lookup_key;

pub use builtins::{lookup_key_chain, DataDigFn, DataHashFn, LookupKeyFn};
pub(crate) use data_dig::DataDigProvider;
pub(crate) use data_hash::DataHashProvider;
pub(crate) use lookup_key::LookupKeyProvider;

use crate::config::{Entry, FunctionKind, Location};
use crate::error::LookupError;
use crate::merge::MergeStrategy;
use crate::session::Invocation;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strata_types::{Key, Map, Scope, Segment, Value};

/// A registered `data_hash` function: returns the whole hash for the
/// location carried in the context options.
pub type DataHashFunc =
    Arc<dyn Fn(&mut ProviderContext<'_, '_>) -> Result<Value, LookupError> + Send + Sync>;

/// A registered `data_dig` function: digs a key's parts out of the source.
pub type DataDigFunc = Arc<
    dyn Fn(&mut ProviderContext<'_, '_>, &[Segment]) -> Result<Option<Value>, LookupError>
        + Send
        + Sync,
>;

/// A registered `lookup_key` function: looks up a single root key.
pub type LookupKeyFunc = Arc<
    dyn Fn(&mut ProviderContext<'_, '_>, &str) -> Result<Option<Value>, LookupError>
        + Send
        + Sync,
>;

/// Per-session table of registered data functions, consulted after the
/// built-ins and before plugin loading.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    data_hash: HashMap<String, DataHashFunc>,
    data_dig: HashMap<String, DataDigFunc>,
    lookup_key: HashMap<String, LookupKeyFunc>,
}

impl FunctionRegistry {
    pub fn register_data_hash(&mut self, name: impl Into<String>, f: DataHashFunc) {
        self.data_hash.insert(name.into(), f);
    }

    pub fn register_data_dig(&mut self, name: impl Into<String>, f: DataDigFunc) {
        self.data_dig.insert(name.into(), f);
    }

    pub fn register_lookup_key(&mut self, name: impl Into<String>, f: LookupKeyFunc) {
        self.lookup_key.insert(name.into(), f);
    }

    #[must_use]
    pub fn data_hash(&self, name: &str) -> Option<DataHashFunc> {
        self.data_hash.get(name).cloned()
    }

    #[must_use]
    pub fn data_dig(&self, name: &str) -> Option<DataDigFunc> {
        self.data_dig.get(name).cloned()
    }

    #[must_use]
    pub fn lookup_key(&self, name: &str) -> Option<LookupKeyFunc> {
        self.lookup_key.get(name).cloned()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("data_hash", &self.data_hash.keys().collect::<Vec<_>>())
            .field("data_dig", &self.data_dig.keys().collect::<Vec<_>>())
            .field("lookup_key", &self.lookup_key.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a data function sees when it is invoked: the entry's interpolated
/// options (plus `path` when a file location is in play) and the calling
/// invocation.
pub struct ProviderContext<'c, 's> {
    invocation: &'c mut Invocation<'s>,
    options: Map,
}

impl<'c, 's> ProviderContext<'c, 's> {
    pub(crate) fn new(invocation: &'c mut Invocation<'s>, options: Map) -> Self {
        Self {
            invocation,
            options,
        }
    }

    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    #[must_use]
    pub fn options(&self) -> &Map {
        &self.options
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.invocation.scope()
    }

    #[must_use]
    pub fn session_options(&self) -> &Map {
        self.invocation.session().options()
    }

    /// The calling invocation, for functions that recurse into lookups.
    pub fn invocation(&mut self) -> &mut Invocation<'s> {
        self.invocation
    }
}

/// Runtime object binding one resolved entry to its data function.
pub trait DataProvider: Send + Sync {
    /// Looks up `key`'s root value in this provider. `None` means not
    /// found; explicit null is a found value.
    fn unchecked_lookup(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        strategy: &MergeStrategy,
    ) -> Result<Option<Value>, LookupError>;

    /// Diagnostic name, e.g. `data_hash function 'yaml_data'`.
    fn full_name(&self) -> String;

    /// The resolved entry this provider serves.
    fn entry(&self) -> &Entry;
}

/// Builds the provider for a resolved entry.
#[must_use]
pub fn create_provider(entry: Entry) -> Box<dyn DataProvider> {
    match entry.function().map(|f| f.kind()) {
        Some(FunctionKind::DataDig) => Box::new(DataDigProvider::new(entry)),
        Some(FunctionKind::LookupKey) => Box::new(LookupKeyProvider::new(entry)),
        _ => Box::new(DataHashProvider::new(entry)),
    }
}

/// The entry's options augmented with the resolved location as `path`.
pub(crate) fn options_with_location(options: Option<&Map>, location: Option<&Location>) -> Map {
    let mut out = options.cloned().unwrap_or_default();
    if let Some(location) = location {
        out.insert("path".into(), Value::from(location.resolved_str()));
    }
    out
}

/// Drives `lookup_at` over the entry's resolved locations using the active
/// merge strategy, skipping locations that do not exist. Entries without
/// locations get a single call with no location.
pub(crate) fn lookup_in_locations(
    entry: &Entry,
    key: &Key,
    invocation: &mut Invocation<'_>,
    strategy: &MergeStrategy,
    mut lookup_at: impl FnMut(
        &Key,
        &mut Invocation<'_>,
        Option<&Location>,
    ) -> Result<Option<Value>, LookupError>,
) -> Result<Option<Value>, LookupError> {
    match entry.locations() {
        Some(locations) => strategy.lookup(locations, invocation, |location, invocation| {
            invocation.explain(
                crate::explain::NodeKind::Location {
                    location: location.describe(),
                },
                |invocation| {
                    if !location.exists() {
                        invocation.explain_accept(
                            crate::explain::Event::LocationNotFound,
                            None,
                            None,
                        );
                        return Ok(None);
                    }
                    lookup_at(key, invocation, Some(location))
                },
            )
        }),
        None => lookup_at(key, invocation, None),
    }
}
