//! `%{…}` interpolation.
//!
//! Expressions are either bare scope references or method calls
//! `method('arg')` with method ∈ {`scope`, `alias`, `lookup`, `hiera`,
//! `literal`} (`hiera` is a synonym for `lookup`). Method syntax is only
//! honoured when the caller allows it; configuration strings and option
//! maps are interpolated with methods disabled.
//!
//! `alias` returns the looked-up value with its type intact and must be
//! the entire input string. Everything else stringifies into the output.
//!
//! Interpolation walks arrays and maps recursively (keys included) and
//! reports whether anything changed, so untouched values short-circuit.

use crate::error::LookupError;
use crate::explain::NodeKind;
use crate::session::Invocation;
use once_cell::sync::Lazy;
use regex::Regex;
use strata_types::{Key, Map, Value};

static IPL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%\{[^}]*\}").unwrap_or_else(|e| panic!("invalid interpolation pattern: {e}"))
});

static METHOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\w+)\((?:"([^"]+)"|'([^']+)')\)$"#)
        .unwrap_or_else(|e| panic!("invalid method pattern: {e}"))
});

/// Expressions that interpolate to the empty string.
const EMPTY_INTERPOLATIONS: &[&str] = &["", "::", r#""""#, "''", r#""::""#, "'::'"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Scope,
    Alias,
    Lookup,
    Literal,
}

/// Resolves all interpolations in `value`.
pub(crate) fn interpolate(
    invocation: &mut Invocation<'_>,
    value: &Value,
    allow_methods: bool,
) -> Result<Value, LookupError> {
    Ok(do_interpolate(invocation, value, allow_methods)?.0)
}

pub(crate) fn do_interpolate(
    invocation: &mut Invocation<'_>,
    value: &Value,
    allow_methods: bool,
) -> Result<(Value, bool), LookupError> {
    match value {
        Value::String(s) => interpolate_string(invocation, s, allow_methods),
        Value::Array(items) => {
            let mut changed = false;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let (v, c) = do_interpolate(invocation, item, allow_methods)?;
                changed |= c;
                out.push(v);
            }
            if changed {
                Ok((Value::Array(out), true))
            } else {
                Ok((value.clone(), false))
            }
        }
        Value::Map(entries) => {
            let mut changed = false;
            let mut out = Map::with_capacity(entries.len());
            for (k, v) in entries {
                let (nk, kc) = interpolate_string(invocation, k, allow_methods)?;
                let (nv, vc) = do_interpolate(invocation, v, allow_methods)?;
                changed |= kc || vc;
                out.insert(nk.display_string(), nv);
            }
            if changed {
                Ok((Value::Map(out), true))
            } else {
                Ok((value.clone(), false))
            }
        }
        other => Ok((other.clone(), false)),
    }
}

pub(crate) fn interpolate_string(
    invocation: &mut Invocation<'_>,
    text: &str,
    allow_methods: bool,
) -> Result<(Value, bool), LookupError> {
    if !text.contains("%{") {
        return Ok((Value::String(text.to_owned()), false));
    }

    invocation.explain(
        NodeKind::Interpolate {
            expression: text.to_owned(),
        },
        |invocation| {
            let mut out = String::new();
            let mut last = 0;
            for found in IPL_PATTERN.find_iter(text) {
                out.push_str(&text[last..found.start()]);
                last = found.end();

                let expr = text[found.start() + 2..found.end() - 1].trim();
                if EMPTY_INTERPOLATIONS.contains(&expr) {
                    continue;
                }
                let (method, data) = method_and_data(expr, allow_methods)?;
                match method {
                    Method::Literal => out.push_str(data),
                    Method::Scope => {
                        let v = resolve_in_scope(invocation, data, allow_methods)?;
                        out.push_str(&v.display_string());
                    }
                    Method::Alias | Method::Lookup => {
                        if method == Method::Alias
                            && (found.start() != 0 || found.end() != text.len())
                        {
                            return Err(LookupError::AliasNotEntireString);
                        }
                        let key = Key::parse(data)?;
                        let v = invocation.sub_lookup(&key)?;
                        if method == Method::Alias {
                            return Ok((v, true));
                        }
                        out.push_str(&v.display_string());
                    }
                }
            }
            out.push_str(&text[last..]);
            Ok((Value::String(out), true))
        },
    )
}

fn method_and_data<'a>(
    expr: &'a str,
    allow_methods: bool,
) -> Result<(Method, &'a str), LookupError> {
    let Some(caps) = METHOD_PATTERN.captures(expr) else {
        return Ok((Method::Scope, expr));
    };
    if !allow_methods {
        return Err(LookupError::MethodNotAllowed);
    }
    let data = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    match &caps[1] {
        "alias" => Ok((Method::Alias, data)),
        "hiera" | "lookup" => Ok((Method::Lookup, data)),
        "literal" => Ok((Method::Literal, data)),
        "scope" => Ok((Method::Scope, data)),
        name => Err(LookupError::UnknownMethod { name: name.into() }),
    }
}

/// Resolves a scope reference: the root is read from the scope, the value
/// is recursively interpolated, then the key's remaining parts are dug out.
/// Anything missing yields null (which stringifies to "").
fn resolve_in_scope(
    invocation: &mut Invocation<'_>,
    expr: &str,
    allow_methods: bool,
) -> Result<Value, LookupError> {
    let key = Key::parse(expr)?;
    let Some(root_value) = invocation.scope().get(key.root()).cloned() else {
        return Ok(Value::Null);
    };
    let (value, _) = do_interpolate(invocation, &root_value, allow_methods)?;

    if key.parts().is_empty() {
        return Ok(value);
    }

    let segment = key
        .parts()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    invocation.explain(
        NodeKind::SubLookup {
            key: expr.to_owned(),
        },
        |invocation| match key.dig(&value) {
            Some(leaf) => {
                let leaf = leaf.clone();
                invocation.explain_leaf_event(
                    NodeKind::Segment {
                        segment: segment.clone(),
                    },
                    crate::explain::Event::Found,
                    Some(segment.clone()),
                    Some(leaf.clone()),
                );
                Ok(leaf)
            }
            None => {
                invocation.explain_leaf_event(
                    NodeKind::Segment {
                        segment: segment.clone(),
                    },
                    crate::explain::Event::NotFound,
                    Some(segment.clone()),
                    None,
                );
                Ok(Value::Null)
            }
        },
    )
}
