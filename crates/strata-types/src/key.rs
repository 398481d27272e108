//! Dotted lookup keys.
//!
//! A key like `server.hosts.0.name` addresses a path into nested data. The
//! first segment is the root; later segments are names or array indexes.
//! Segments may be quoted (`'…'` or `"…"`) so they can contain dots or
//! start with digits without being read as indexes.

use crate::value::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// One segment of a [`Key`] after the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Name(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(n) => f.write_str(n),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Key parsing errors.
#[derive(Debug, Clone, Error)]
pub enum KeyError {
    #[error("lookup key must not be empty")]
    Empty,

    #[error("empty segment in lookup key '{key_str}'")]
    EmptySegment { key_str: String },

    #[error("unterminated quote in lookup key '{key_str}'")]
    UnterminatedQuote { key_str: String },
}

/// A parsed lookup key.
///
/// Equality and hashing are defined over [`Key::source`], so parsing the
/// source of a key yields an equal key.
#[derive(Debug, Clone)]
pub struct Key {
    source: String,
    root: String,
    parts: Vec<Segment>,
}

impl Key {
    /// Parses a dotted key string.
    pub fn parse(source: &str) -> Result<Self, KeyError> {
        if source.is_empty() {
            return Err(KeyError::Empty);
        }

        let mut segments: Vec<(String, bool)> = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut quote: Option<char> = None;

        for ch in source.chars() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => current.push(ch),
                None => match ch {
                    '\'' | '"' => {
                        quote = Some(ch);
                        quoted = true;
                    }
                    '.' => {
                        segments.push((std::mem::take(&mut current), quoted));
                        quoted = false;
                    }
                    _ => current.push(ch),
                },
            }
        }
        if quote.is_some() {
            return Err(KeyError::UnterminatedQuote {
                key_str: source.to_owned(),
            });
        }
        segments.push((current, quoted));

        let mut it = segments.into_iter();
        let (root, _) = it.next().unwrap_or_default();
        if root.is_empty() {
            return Err(KeyError::EmptySegment {
                key_str: source.to_owned(),
            });
        }

        let mut parts = Vec::new();
        for (text, was_quoted) in it {
            if text.is_empty() {
                return Err(KeyError::EmptySegment {
                    key_str: source.to_owned(),
                });
            }
            // A bare all-digit segment addresses into an array.
            if !was_quoted && text.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(ix) = text.parse::<usize>() {
                    parts.push(Segment::Index(ix));
                    continue;
                }
            }
            parts.push(Segment::Name(text));
        }

        Ok(Self {
            source: source.to_owned(),
            root,
            parts,
        })
    }

    /// The original string this key was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The first segment.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// All segments after the root.
    #[must_use]
    pub fn parts(&self) -> &[Segment] {
        &self.parts
    }

    /// Navigates `value` along [`Key::parts`]. `None` when a step does not
    /// exist or the current value has the wrong shape.
    #[must_use]
    pub fn dig<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for part in &self.parts {
            current = match (current, part) {
                (Value::Map(m), Segment::Name(n)) => m.get(n)?,
                (Value::Map(m), Segment::Index(i)) => m.get(i.to_string().as_str())?,
                (Value::Array(a), Segment::Index(i)) => a.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Wraps `value` in nested maps/arrays shaped by [`Key::parts`], so that
    /// digging this key back out of the result yields `value`.
    #[must_use]
    pub fn bury(&self, value: Value) -> Value {
        self.parts.iter().rev().fold(value, |acc, part| match part {
            Segment::Name(n) => {
                let mut m = Map::new();
                m.insert(n.clone(), acc);
                Value::Map(m)
            }
            Segment::Index(i) => {
                let mut a = vec![Value::Null; *i];
                a.push(acc);
                Value::Array(a)
            }
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn simple_key() {
        let k = key("foo");
        assert_eq!(k.root(), "foo");
        assert!(k.parts().is_empty());
    }

    #[test]
    fn dotted_segments() {
        let k = key("a.b.2.c");
        assert_eq!(k.root(), "a");
        assert_eq!(
            k.parts(),
            &[
                Segment::Name("b".into()),
                Segment::Index(2),
                Segment::Name("c".into())
            ]
        );
    }

    #[test]
    fn quoted_segment_keeps_dots() {
        let k = key("a.'b.c'.d");
        assert_eq!(
            k.parts(),
            &[Segment::Name("b.c".into()), Segment::Name("d".into())]
        );
    }

    #[test]
    fn quoted_digits_stay_names() {
        let k = key("a.\"10\"");
        assert_eq!(k.parts(), &[Segment::Name("10".into())]);
    }

    #[test]
    fn parse_source_roundtrip() {
        for s in ["foo", "a.b.c", "a.'b.c'.0", "x.\"7\".y"] {
            let k = key(s);
            assert_eq!(Key::parse(k.source()).unwrap(), k);
        }
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(Key::parse("").is_err());
        assert!(Key::parse("a..b").is_err());
        assert!(Key::parse("a.").is_err());
        assert!(Key::parse("a.'b").is_err());
    }

    #[test]
    fn dig_into_maps_and_arrays() {
        let data: Value = serde_json::from_str(r#"{"b":[{"c":42}]}"#).unwrap();
        assert_eq!(key("a.b.0.c").dig(&data), Some(&Value::Int(42)));
        assert_eq!(key("a.b.1.c").dig(&data), None);
        assert_eq!(key("a.b.0.x").dig(&data), None);
    }

    #[test]
    fn dig_wrong_shape_is_not_found() {
        let data = Value::from("scalar");
        assert_eq!(key("a.b").dig(&data), None);
    }

    #[test]
    fn bury_then_dig_is_identity() {
        for s in ["a.b.c", "a.2.x", "a.'dot.ted'"] {
            let k = key(s);
            let buried = k.bury(Value::Int(7));
            assert_eq!(k.dig(&buried), Some(&Value::Int(7)));
        }
    }

    #[test]
    fn bury_index_pads_with_nulls() {
        let k = key("a.2");
        let buried = k.bury(Value::from("v"));
        assert_eq!(
            buried,
            Value::Array(vec![Value::Null, Value::Null, Value::from("v")])
        );
    }

    #[test]
    fn bury_without_parts_is_value() {
        assert_eq!(key("a").bury(Value::Int(1)), Value::Int(1));
    }
}
