//! The `data_dig` provider.

use crate::config::{Entry, Location};
use crate::error::LookupError;
use crate::explain::{Event, NodeKind};
use crate::merge::MergeStrategy;
use crate::provider::builtins::DataDigFn;
use crate::provider::{
    lookup_in_locations, options_with_location, DataProvider, ProviderContext,
};
use crate::session::Invocation;
use once_cell::sync::OnceCell;
use strata_types::{Key, Value};

/// Serves entries whose function digs a key's parts out of the source
/// itself. Results are not cached here; the function is expected to be
/// expensive in its own right and manage its own cost.
///
/// The returned value is buried under the key's parts so that the final
/// dig in the lookup pipeline unwraps it again.
pub(crate) struct DataDigProvider {
    entry: Entry,
    function: OnceCell<DataDigFn>,
}

impl DataDigProvider {
    pub(crate) fn new(entry: Entry) -> Self {
        Self {
            entry,
            function: OnceCell::new(),
        }
    }

    fn lookup_at(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        location: Option<&Location>,
    ) -> Result<Option<Value>, LookupError> {
        let function = self
            .function
            .get_or_try_init(|| DataDigFn::resolve(&self.entry, invocation.session()))?;
        let options = options_with_location(self.entry.options(), location);
        let value = {
            let mut ctx = ProviderContext::new(invocation, options);
            function.call(&mut ctx, key.parts())?
        };
        match value {
            Some(value) => {
                invocation.explain_accept(
                    Event::Found,
                    Some(key.source().to_owned()),
                    Some(value.clone()),
                );
                Ok(Some(key.bury(value)))
            }
            None => {
                invocation.explain_accept(Event::NotFound, Some(key.source().to_owned()), None);
                Ok(None)
            }
        }
    }
}

impl DataProvider for DataDigProvider {
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
        format!("data_dig function '{name}'")
    }

    fn entry(&self) -> &Entry {
        &self.entry
    }
}
