//! Merge strategies.
//!
//! A strategy drives iteration over a sequence of sources (hierarchy
//! providers, or a provider's locations) and combines their results:
//!
//! - `first`: the first found value wins, remaining sources are skipped
//! - `unique`: results are flattened into one deduplicated array
//! - `hash`: maps are shallow-merged, earlier entries win
//! - `deep`: maps are merged recursively; earlier values win at scalar
//!   leaves, nested maps merge, arrays concatenate and dedupe
//!
//! `deep` honours the `knockout_prefix` and `merge_hash_arrays` options.

use crate::error::LookupError;
use crate::session::Invocation;
use std::collections::HashSet;
use strata_types::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    First,
    Unique,
    Hash,
    Deep,
}

/// A per-lookup merge strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStrategy {
    kind: Kind,
    knockout_prefix: Option<String>,
    merge_hash_arrays: bool,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::first()
    }
}

impl MergeStrategy {
    #[must_use]
    pub fn first() -> Self {
        Self {
            kind: Kind::First,
            knockout_prefix: None,
            merge_hash_arrays: false,
        }
    }

    #[must_use]
    pub fn unique() -> Self {
        Self {
            kind: Kind::Unique,
            ..Self::first()
        }
    }

    #[must_use]
    pub fn hash() -> Self {
        Self {
            kind: Kind::Hash,
            ..Self::first()
        }
    }

    #[must_use]
    pub fn deep() -> Self {
        Self {
            kind: Kind::Deep,
            ..Self::first()
        }
    }

    /// Parses a strategy name (`first`, `unique`, `hash`, `deep`).
    pub fn from_name(name: &str) -> Result<Self, LookupError> {
        match name {
            "first" => Ok(Self::first()),
            "unique" => Ok(Self::unique()),
            "hash" => Ok(Self::hash()),
            "deep" => Ok(Self::deep()),
            _ => Err(LookupError::UnknownMergeStrategy { name: name.into() }),
        }
    }

    /// Parses the `merge` entry of a `lookup_options` hash: either a bare
    /// strategy name or a map with a `strategy` key plus options.
    pub fn from_value(value: &Value) -> Result<Self, LookupError> {
        match value {
            Value::String(name) => Self::from_name(name),
            Value::Map(m) => {
                let name = m
                    .get("strategy")
                    .map(Value::expect_str)
                    .transpose()?
                    .unwrap_or("first");
                let mut strategy = Self::from_name(name)?;
                if let Some(ko) = m.get("knockout_prefix") {
                    strategy.knockout_prefix = Some(ko.expect_str()?.to_owned());
                }
                if let Some(mha) = m.get("merge_hash_arrays") {
                    strategy.merge_hash_arrays = mha.as_bool().unwrap_or(false);
                }
                Ok(strategy)
            }
            other => Err(LookupError::UnknownMergeStrategy {
                name: other.display_string(),
            }),
        }
    }

    /// The descriptive name used in explanations.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.kind {
            Kind::First => "first found strategy",
            Kind::Unique => "unique merge strategy",
            Kind::Hash => "hash merge strategy",
            Kind::Deep => "deep merge strategy",
        }
    }

    /// Drives the strategy over `sources` in order, obtaining each source's
    /// value through `f`. Sources yielding `None` are skipped; `first`
    /// short-circuits on the first hit.
    pub fn lookup<T>(
        &self,
        sources: &[T],
        invocation: &mut Invocation<'_>,
        mut f: impl FnMut(&T, &mut Invocation<'_>) -> Result<Option<Value>, LookupError>,
    ) -> Result<Option<Value>, LookupError> {
        if self.kind == Kind::First {
            for source in sources {
                if let Some(value) = f(source, invocation)? {
                    return Ok(Some(value));
                }
            }
            return Ok(None);
        }

        let mut values = Vec::new();
        for source in sources {
            if let Some(value) = f(source, invocation)? {
                values.push(value);
            }
        }
        self.merge_all(values)
    }

    fn merge_all(&self, values: Vec<Value>) -> Result<Option<Value>, LookupError> {
        if values.is_empty() {
            return Ok(None);
        }
        match self.kind {
            Kind::First => Ok(values.into_iter().next()),
            Kind::Unique => merge_unique(values).map(Some),
            Kind::Hash => merge_hash(values).map(Some),
            Kind::Deep => {
                let mut it = values.into_iter();
                let mut acc = it.next().unwrap_or_default();
                for next in it {
                    acc = self.deep_merge(acc, next);
                }
                Ok(Some(acc))
            }
        }
    }

    /// Merges the lower-priority `low` into the higher-priority `high`.
    fn deep_merge(&self, high: Value, low: Value) -> Value {
        match (high, low) {
            (Value::Map(high), Value::Map(low)) => {
                let mut out = Map::with_capacity(high.len());
                let mut knocked_out = HashSet::new();
                for (k, hv) in high {
                    if self.is_knockout(&hv) {
                        knocked_out.insert(k);
                        continue;
                    }
                    match low.get(&k) {
                        Some(lv) => out.insert(k, self.deep_merge(hv, lv.clone())),
                        None => out.insert(k, hv),
                    };
                }
                // A knockout sentinel in any layer suppresses the key; it
                // never appears in the merged result itself.
                for (k, lv) in low {
                    if knocked_out.contains(&k)
                        || out.contains_key(&k)
                        || self.is_knockout(&lv)
                    {
                        continue;
                    }
                    out.insert(k, lv);
                }
                Value::Map(out)
            }
            (Value::Array(high), Value::Array(low)) => {
                if self.merge_hash_arrays && is_map_array(&high) && is_map_array(&low) {
                    let mut out = Vec::with_capacity(high.len().max(low.len()));
                    let mut low_it = low.into_iter();
                    for hv in high {
                        match low_it.next() {
                            Some(lv) => out.push(self.deep_merge(hv, lv)),
                            None => out.push(hv),
                        }
                    }
                    out.extend(low_it);
                    Value::Array(out)
                } else {
                    let mut out = high;
                    for lv in low {
                        if !out.contains(&lv) {
                            out.push(lv);
                        }
                    }
                    Value::Array(out)
                }
            }
            // Scalar leaves and mixed shapes: the earlier value wins.
            (high, _) => high,
        }
    }

    fn is_knockout(&self, value: &Value) -> bool {
        match (&self.knockout_prefix, value) {
            (Some(prefix), Value::String(s)) => s == &format!("{prefix}existing"),
            _ => false,
        }
    }
}

fn is_map_array(values: &[Value]) -> bool {
    !values.is_empty() && values.iter().all(|v| v.as_map().is_some())
}

/// Flattens every value into one array, deduplicating while preserving
/// first-seen order. Map elements are an error.
fn merge_unique(values: Vec<Value>) -> Result<Value, LookupError> {
    let mut out: Vec<Value> = Vec::new();
    let mut push = |v: Value| -> Result<(), LookupError> {
        if v.as_map().is_some() {
            return Err(LookupError::UniqueOnMap);
        }
        if !out.contains(&v) {
            out.push(v);
        }
        Ok(())
    };
    for value in values {
        match value {
            Value::Map(_) => return Err(LookupError::UniqueOnMap),
            Value::Array(items) => {
                for item in items {
                    push(item)?;
                }
            }
            scalar => push(scalar)?,
        }
    }
    Ok(Value::Array(out))
}

/// Shallow map merge; earlier entries win on key conflicts.
fn merge_hash(values: Vec<Value>) -> Result<Value, LookupError> {
    let mut out = Map::new();
    for value in values {
        let m = match value {
            Value::Map(m) => m,
            other => {
                return Err(LookupError::HashMergeKind {
                    actual: other.kind(),
                })
            }
        };
        for (k, v) in m {
            out.entry(k).or_insert(v);
        }
    }
    Ok(Value::Map(out))
}
