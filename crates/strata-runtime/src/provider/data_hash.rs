//! The `data_hash` provider.

use crate::config::Entry;
use crate::error::LookupError;
use crate::explain::{Event, NodeKind};
use crate::merge::MergeStrategy;
use crate::provider::builtins::DataHashFn;
use crate::provider::{
    lookup_in_locations, options_with_location, DataProvider, ProviderContext,
};
use crate::session::Invocation;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use strata_types::{Key, Map, Value};

/// Serves entries whose function returns a whole hash per location.
///
/// The hash is computed at most once per resolved location and cached for
/// the session; readers share the lock, the first miss upgrades to an
/// exclusive lock with a double-check.
pub(crate) struct DataHashProvider {
    entry: Entry,
    function: OnceCell<DataHashFn>,
    hashes: RwLock<HashMap<String, Arc<Map>>>,
}

impl DataHashProvider {
    pub(crate) fn new(entry: Entry) -> Self {
        Self {
            entry,
            function: OnceCell::new(),
            hashes: RwLock::new(HashMap::new()),
        }
    }

    fn data_hash(
        &self,
        invocation: &mut Invocation<'_>,
        location: Option<&crate::config::Location>,
    ) -> Result<Arc<Map>, LookupError> {
        let cache_key = location
            .map(crate::config::Location::resolved_str)
            .unwrap_or_default();

        if let Some(hash) = self.hashes.read().get(&cache_key) {
            return Ok(Arc::clone(hash));
        }

        let mut hashes = self.hashes.write();
        if let Some(hash) = hashes.get(&cache_key) {
            return Ok(Arc::clone(hash));
        }

        let function = self
            .function
            .get_or_try_init(|| DataHashFn::resolve(&self.entry, invocation.session()))?;
        let options = options_with_location(self.entry.options(), location);
        let hash = {
            let mut ctx = ProviderContext::new(invocation, options);
            function.call(&mut ctx)?
        };
        let hash = Arc::new(hash);
        hashes.insert(cache_key, Arc::clone(&hash));
        Ok(hash)
    }

    fn lookup_at(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        location: Option<&crate::config::Location>,
    ) -> Result<Option<Value>, LookupError> {
        let hash = self.data_hash(invocation, location)?;
        match hash.get(key.root()) {
            Some(value) => {
                let value = invocation.interpolate(value, true)?;
                invocation.explain_accept(
                    Event::Found,
                    Some(key.root().to_owned()),
                    Some(value.clone()),
                );
                Ok(Some(value))
            }
            None => {
                invocation.explain_accept(Event::NoSuchKey, Some(key.root().to_owned()), None);
                Ok(None)
            }
        }
    }
}

impl DataProvider for DataHashProvider {
    fn unchecked_lookup(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        strategy: &MergeStrategy,
    ) -> Result<Option<Value>, LookupError> {
        invocation.explain(
            NodeKind::Provider {
                name: self.full_name(),
            },
            |invocation| {
                lookup_in_locations(&self.entry, key, invocation, strategy, |key, inv, loc| {
                    self.lookup_at(key, inv, loc)
                })
            },
        )
    }

    fn full_name(&self) -> String {
        let name = self
            .entry
            .function()
            .map(|f| f.name())
            .unwrap_or_default();
        format!("data_hash function '{name}'")
    }

    fn entry(&self) -> &Entry {
        &self.entry
    }
}
