//! The interpolation variable store.
//!
//! A [`Scope`] is an immutable, layered set of named values. The session
//! snapshot forms the base layer; mapped-path templating and per-invocation
//! variables push cheap overlay layers on top of it. Later layers shadow
//! earlier ones.

use crate::value::{Map, Value};
use std::sync::Arc;

/// Immutable layered variable store.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    layers: Vec<Arc<Map>>,
}

impl Scope {
    /// Creates a scope with a single base layer.
    #[must_use]
    pub fn new(vars: Map) -> Self {
        Self {
            layers: vec![Arc::new(vars)],
        }
    }

    /// Returns a scope with `vars` layered on top of `self`.
    #[must_use]
    pub fn overlay(&self, vars: Map) -> Self {
        let mut layers = self.layers.clone();
        layers.push(Arc::new(vars));
        Self { layers }
    }

    /// Returns a scope with a single extra variable layered on top.
    #[must_use]
    pub fn with_var(&self, name: impl Into<String>, value: Value) -> Self {
        let mut vars = Map::new();
        vars.insert(name.into(), value);
        self.overlay(vars)
    }

    /// Looks up a variable, newest layer first. A leading `::` on the name
    /// is ignored (compatibility with global-qualified references).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix("::").unwrap_or(name);
        self.layers.iter().rev().find_map(|l| l.get(name))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.is_empty())
    }
}
