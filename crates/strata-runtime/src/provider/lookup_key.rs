//! The `lookup_key` provider.

use crate::config::{Entry, Location};
use crate::error::LookupError;
use crate::explain::{Event, NodeKind};
use crate::merge::MergeStrategy;
use crate::provider::builtins::LookupKeyFn;
use crate::provider::{
    lookup_in_locations, options_with_location, DataProvider, ProviderContext,
};
use crate::session::Invocation;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use strata_types::{Key, Value};

/// Serves entries whose function looks up a single root key.
///
/// Results are cached per `(resolved location, root key)`; a miss is
/// cached too, as the not-found sentinel, so the function runs at most
/// once per pair within a session.
pub(crate) struct LookupKeyProvider {
    entry: Entry,
    function: OnceCell<LookupKeyFn>,
    cache: RwLock<HashMap<(String, String), Option<Value>>>,
}

impl LookupKeyProvider {
    pub(crate) fn new(entry: Entry) -> Self {
        Self {
            entry,
            function: OnceCell::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn lookup_at(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        location: Option<&Location>,
    ) -> Result<Option<Value>, LookupError> {
        let cache_key = (
            location.map(Location::resolved_str).unwrap_or_default(),
            key.root().to_owned(),
        );

        let cached = self.cache.read().get(&cache_key).cloned();
        let value = match cached {
            Some(value) => value,
            None => self.compute(key, invocation, location, cache_key)?,
        };

        match &value {
            Some(v) => invocation.explain_accept(
                Event::Found,
                Some(key.root().to_owned()),
                Some(v.clone()),
            ),
            None => {
                invocation.explain_accept(Event::NotFound, Some(key.root().to_owned()), None)
            }
        }
        Ok(value)
    }

    /// Runs the function under the exclusive lock, with a double-check so
    /// the function executes at most once per cache key.
    fn compute(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        location: Option<&Location>,
        cache_key: (String, String),
    ) -> Result<Option<Value>, LookupError> {
        let mut cache = self.cache.write();
        if let Some(value) = cache.get(&cache_key) {
            return Ok(value.clone());
        }
        let function = self
            .function
            .get_or_try_init(|| LookupKeyFn::resolve(&self.entry, invocation.session()))?;
        let options = options_with_location(self.entry.options(), location);
        let value = {
            let mut ctx = ProviderContext::new(invocation, options);
            function.call(&mut ctx, key.root())?
        };
        cache.insert(cache_key, value.clone());
        Ok(value)
    }
}

impl DataProvider for LookupKeyProvider {
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
        format!("lookup_key function '{name}'")
    }

    fn entry(&self) -> &Entry {
        &self.entry
    }
}
