//! Per-call lookup context.
//!
//! An [`Invocation`] carries everything one top-level call needs: the
//! scope snapshot, the name stack guarding against interpolation cycles,
//! the mode flag distinguishing ordinary lookups from configuration and
//! `lookup_options` resolution, and the optional explainer. Invocations
//! are single-threaded; concurrent callers create one each over a shared
//! [`Session`](crate::session::Session).

use crate::convert::convert_to;
use crate::error::LookupError;
use crate::explain::{Event, Explainer, NodeKind};
use crate::merge::MergeStrategy;
use crate::session::{ResolvedConfig, Session};
use strata_types::{Key, Map, Scope, Value};

/// What a lookup is currently resolving. Configuration and
/// `lookup_options` resolution disable further `lookup_options`
/// consultation to prevent infinite regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    Config,
    LookupOptions,
}

/// Caller-supplied options for one lookup call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Merge strategy to use unless `lookup_options` overrides it.
    pub merge: Option<MergeStrategy>,
}

/// The context of one top-level lookup call.
pub struct Invocation<'s> {
    session: &'s Session,
    scope: Scope,
    name_stack: Vec<String>,
    mode: Mode,
    explainer: Option<Explainer>,
}

impl<'s> Invocation<'s> {
    pub(crate) fn new(
        session: &'s Session,
        extra_scope: Option<Map>,
        explainer: Option<Explainer>,
    ) -> Self {
        let scope = match extra_scope {
            Some(vars) => session.scope().overlay(vars),
            None => session.scope().clone(),
        };
        Self {
            session,
            scope,
            name_stack: Vec::new(),
            mode: Mode::Normal,
            explainer,
        }
    }

    #[must_use]
    pub fn session(&self) -> &'s Session {
        self.session
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The explainer, if one was attached.
    #[must_use]
    pub fn explainer(&self) -> Option<&Explainer> {
        self.explainer.as_ref()
    }

    /// Detaches the explainer, typically to render it after a lookup.
    pub fn take_explainer(&mut self) -> Option<Explainer> {
        self.explainer.take()
    }

    // ── explainer plumbing ───────────────────────────────────────────

    fn recording(&self) -> bool {
        match &self.explainer {
            None => false,
            Some(e) => match self.mode {
                Mode::Normal => e.explains_data(),
                Mode::LookupOptions => e.explains_options(),
                Mode::Config => false,
            },
        }
    }

    pub(crate) fn explain<R>(&mut self, kind: NodeKind, f: impl FnOnce(&mut Self) -> R) -> R {
        if !self.recording() {
            return f(self);
        }
        if let Some(e) = &mut self.explainer {
            e.push(kind);
        }
        let result = f(self);
        if let Some(e) = &mut self.explainer {
            e.pop();
        }
        result
    }

    pub(crate) fn explain_accept(
        &mut self,
        event: Event,
        key: Option<String>,
        value: Option<Value>,
    ) {
        if self.recording() {
            if let Some(e) = &mut self.explainer {
                e.accept(event, key, value);
            }
        }
    }

    pub(crate) fn explain_leaf_event(
        &mut self,
        kind: NodeKind,
        event: Event,
        key: Option<String>,
        value: Option<Value>,
    ) {
        if self.recording() {
            if let Some(e) = &mut self.explainer {
                e.push(kind);
                e.accept(event, key, value);
                e.pop();
            }
        }
    }

    /// The "merge strategy came from lookup_options" notice is reported
    /// whenever any explanation is enabled, even when the data trace
    /// itself is not.
    fn explain_merge_source(&mut self) {
        if let Some(e) = &mut self.explainer {
            if e.is_enabled() {
                e.leaf(NodeKind::MergeSource {
                    source: "lookup_options".to_owned(),
                });
            }
        }
    }

    // ── derived contexts ─────────────────────────────────────────────

    pub(crate) fn with_mode<R>(&mut self, mode: Mode, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.mode, mode);
        let result = f(self);
        self.mode = previous;
        result
    }

    /// Runs `f` with `name` bound in the scope, for mapped-path templating.
    pub(crate) fn with_scope_var<R>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let overlaid = self.scope.with_var(name, value);
        let saved = std::mem::replace(&mut self.scope, overlaid);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Pushes the key's root onto the name stack for the duration of `f`.
    /// Re-entering a root that is already being resolved is a cycle error.
    pub(crate) fn with_lookup<R>(
        &mut self,
        key: &Key,
        f: impl FnOnce(&mut Self) -> Result<R, LookupError>,
    ) -> Result<R, LookupError> {
        let root = key.root().to_owned();
        if self.name_stack.contains(&root) {
            return Err(LookupError::EndlessRecursion {
                key: key.source().to_owned(),
            });
        }
        self.name_stack.push(root);
        let result = f(self);
        self.name_stack.pop();
        result
    }

    // ── interpolation ────────────────────────────────────────────────

    /// Resolves `%{…}` interpolations in `value`. During the
    /// `lookup_options` bootstrap, method syntax is disabled regardless of
    /// `allow_methods`.
    pub fn interpolate(
        &mut self,
        value: &Value,
        allow_methods: bool,
    ) -> Result<Value, LookupError> {
        let allow = allow_methods && self.mode != Mode::LookupOptions;
        crate::interpolate::interpolate(self, value, allow)
    }

    /// Interpolates a single string and stringifies the result.
    pub fn interpolate_string(
        &mut self,
        text: &str,
        allow_methods: bool,
    ) -> Result<String, LookupError> {
        let allow = allow_methods && self.mode != Mode::LookupOptions;
        let (value, _) = crate::interpolate::interpolate_string(self, text, allow)?;
        Ok(value.display_string())
    }

    /// A nested lookup on behalf of a `%{lookup(…)}`/`%{alias(…)}`
    /// interpolation: not-found becomes null.
    pub(crate) fn sub_lookup(&mut self, key: &Key) -> Result<Value, LookupError> {
        Ok(self
            .lookup(key, None, &CallOptions::default())?
            .unwrap_or(Value::Null))
    }

    // ── the lookup pipeline ──────────────────────────────────────────

    /// Looks up `key`, falling back to `default` when nothing is found.
    pub fn lookup(
        &mut self,
        key: &Key,
        default: Option<&Value>,
        call: &CallOptions,
    ) -> Result<Option<Value>, LookupError> {
        let session = self.session;
        if session.is_cancelled() {
            return Err(LookupError::Cancelled);
        }
        let config = session.resolved_config(self)?;
        let result = self.lookup_in(&config, key, call)?;
        Ok(result.or_else(|| default.cloned()))
    }

    fn lookup_in(
        &mut self,
        config: &ResolvedConfig,
        key: &Key,
        call: &CallOptions,
    ) -> Result<Option<Value>, LookupError> {
        let key_options = match self.mode {
            Mode::Normal => config.lookup_options(key.root()).cloned(),
            _ => None,
        };

        let merge_from_options = key_options.as_ref().and_then(|o| o.get("merge"));
        let strategy = match merge_from_options {
            Some(v) => MergeStrategy::from_value(v)?,
            None => call.merge.clone().unwrap_or_default(),
        };
        let from_options = merge_from_options.is_some();

        let merged = self.explain(
            NodeKind::Lookup {
                key: key.source().to_owned(),
            },
            |inv| {
                if from_options {
                    inv.explain_merge_source();
                }
                inv.with_lookup(key, |inv| {
                    inv.explain(
                        NodeKind::Merge {
                            strategy: strategy.name().to_owned(),
                        },
                        |inv| {
                            let mut value =
                                strategy.lookup(config.providers(), inv, |p, inv| {
                                    p.unchecked_lookup(key, inv, &strategy)
                                })?;
                            if value.is_none() && !config.default_providers().is_empty() {
                                value =
                                    strategy.lookup(config.default_providers(), inv, |p, inv| {
                                        p.unchecked_lookup(key, inv, &strategy)
                                    })?;
                            }
                            if let Some(v) = &value {
                                inv.explain_accept(Event::Result, None, Some(v.clone()));
                            }
                            Ok(value)
                        },
                    )
                })
            },
        )?;

        let Some(merged) = merged else {
            return Ok(None);
        };
        let value = if key.parts().is_empty() {
            Some(merged)
        } else {
            key.dig(&merged).cloned()
        };
        let Some(value) = value else {
            return Ok(None);
        };

        match key_options.as_ref().and_then(|o| o.get("convert_to")) {
            Some(Value::String(type_name)) => Ok(Some(convert_to(value, type_name)?)),
            _ => Ok(Some(value)),
        }
    }
}
