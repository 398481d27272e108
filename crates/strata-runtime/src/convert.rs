//! Result type coercion for `convert_to` and the CLI `--type` assertion.
//!
//! A small built-in coercion set covers the practically used type names.
//! Names are matched case-insensitively and the common short forms are
//! accepted (`int`, `str`, `bool`).

use crate::error::LookupError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use strata_types::Value;

/// Coerces `value` to the named type, or fails with a typed error.
pub fn convert_to(value: Value, type_name: &str) -> Result<Value, LookupError> {
    let fail = |value: &Value| LookupError::ConvertFailed {
        actual: value.kind(),
        target: type_name.to_owned(),
    };

    match type_name.to_ascii_lowercase().as_str() {
        "string" | "str" | "s" => Ok(Value::String(value.display_string())),
        "integer" | "int" => match &value {
            Value::Int(_) => Ok(value),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            Value::String(s) => s.parse::<i64>().map(Value::Int).map_err(|_| fail(&value)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            _ => Err(fail(&value)),
        },
        "float" => match &value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::String(s) => s.parse::<f64>().map(Value::Float).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        "boolean" | "bool" => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Value::Bool(true)),
                "false" | "no" => Ok(Value::Bool(false)),
                _ => Err(fail(&value)),
            },
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            _ => Err(fail(&value)),
        },
        "array" => match value {
            Value::Array(_) => Ok(value),
            other => Ok(Value::Array(vec![other])),
        },
        "hash" | "map" => match &value {
            Value::Map(_) => Ok(value),
            _ => Err(fail(&value)),
        },
        "binary" => match &value {
            Value::Binary(_) => Ok(value),
            Value::String(s) => BASE64
                .decode(s.as_bytes())
                .map(Value::Binary)
                .map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        _ => Err(LookupError::UnknownConvertType {
            name: type_name.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_coercion_stringifies() {
        assert_eq!(
            convert_to(Value::Int(23), "string").unwrap(),
            Value::from("23")
        );
    }

    #[test]
    fn integer_from_string() {
        assert_eq!(convert_to(Value::from("23"), "int").unwrap(), Value::Int(23));
        assert!(convert_to(Value::from("x"), "int").is_err());
    }

    #[test]
    fn boolean_forms() {
        assert_eq!(
            convert_to(Value::from("yes"), "bool").unwrap(),
            Value::Bool(true)
        );
        assert!(convert_to(Value::from("maybe"), "bool").is_err());
    }

    #[test]
    fn array_wraps_scalars() {
        assert_eq!(
            convert_to(Value::Int(1), "array").unwrap(),
            Value::Array(vec![Value::Int(1)])
        );
    }

    #[test]
    fn binary_from_base64_string() {
        assert_eq!(
            convert_to(Value::from("YWJj"), "binary").unwrap(),
            Value::Binary(b"abc".to_vec())
        );
        assert!(convert_to(Value::from("!!"), "binary").is_err());
    }

    #[test]
    fn unknown_type_name() {
        let err = convert_to(Value::Null, "Frob").unwrap_err();
        assert!(matches!(err, LookupError::UnknownConvertType { name } if name == "Frob"));
    }
}
