//! YAML ⇄ [`Value`] conversion.
//!
//! Used by the `yaml_data` function, the configuration loader and the CLI
//! (`--vars` files, `--var` literals). Map key order is preserved.

use strata_types::{Map, Value};
use yaml_rust2::{ScanError, Yaml, YamlLoader};

/// YAML conversion errors.
#[derive(Debug, thiserror::Error)]
pub enum YamlError {
    #[error("{0}")]
    Scan(#[from] ScanError),

    #[error("unsupported YAML construct: {0}")]
    Unsupported(&'static str),

    #[error("invalid number '{0}'")]
    BadNumber(String),
}

/// Parses a YAML document into a [`Value`].
///
/// An empty document yields [`Value::Null`]. Only the first document of a
/// multi-document stream is used.
pub fn parse_str(text: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(text)?;
    match docs.first() {
        Some(doc) => yaml_to_value(doc),
        None => Ok(Value::Null),
    }
}

/// Converts a parsed YAML node into a [`Value`].
pub fn yaml_to_value(yaml: &Yaml) -> Result<Value, YamlError> {
    Ok(match yaml {
        Yaml::Null | Yaml::BadValue => Value::Null,
        Yaml::Boolean(b) => Value::Bool(*b),
        Yaml::Integer(i) => Value::Int(*i),
        Yaml::Real(r) => Value::Float(
            r.parse::<f64>()
                .map_err(|_| YamlError::BadNumber(r.clone()))?,
        ),
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(yaml_to_value(item)?);
            }
            Value::Array(out)
        }
        Yaml::Hash(hash) => {
            let mut out = Map::with_capacity(hash.len());
            for (k, v) in hash {
                out.insert(yaml_key(k)?, yaml_to_value(v)?);
            }
            Value::Map(out)
        }
        Yaml::Alias(_) => return Err(YamlError::Unsupported("alias")),
    })
}

/// Map keys become strings: scalars are stringified, anything else is an
/// error.
fn yaml_key(yaml: &Yaml) -> Result<String, YamlError> {
    Ok(match yaml {
        Yaml::String(s) => s.clone(),
        Yaml::Integer(i) => i.to_string(),
        Yaml::Real(r) => r.clone(),
        Yaml::Boolean(b) => b.to_string(),
        _ => return Err(YamlError::Unsupported("non-scalar map key")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(parse_str("23").unwrap(), Value::Int(23));
        assert_eq!(parse_str("x").unwrap(), Value::from("x"));
        assert_eq!(parse_str("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_str("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(parse_str("~").unwrap(), Value::Null);
    }

    #[test]
    fn empty_document_is_null() {
        assert_eq!(parse_str("").unwrap(), Value::Null);
    }

    #[test]
    fn nested_structures_keep_order() {
        let v = parse_str("z: 1\na:\n  - x\n  - k: 2\n").unwrap();
        let m = v.as_map().unwrap();
        let keys: Vec<_> = m.keys().collect();
        assert_eq!(keys, ["z", "a"]);
        let a = m["a"].as_array().unwrap();
        assert_eq!(a[0], Value::from("x"));
        assert_eq!(a[1].as_map().unwrap()["k"], Value::Int(2));
    }

    #[test]
    fn integer_keys_stringify() {
        let v = parse_str("1: one").unwrap();
        assert_eq!(v.as_map().unwrap()["1"], Value::from("one"));
    }

    #[test]
    fn flow_style_parses() {
        let v = parse_str(r#"{a: "the option value"}"#).unwrap();
        assert_eq!(v.as_map().unwrap()["a"], Value::from("the option value"));
    }
}
