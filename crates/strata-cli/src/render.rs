//! Output rendering for lookup results.
//!
//! Formats: `yaml` (the default), `json` (compact), `s` (plain text) and
//! `binary` (raw bytes, for binary values or base64 strings).

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Write;
use strata_types::Value;

/// Renders `value` in the given format. Text formats end with a newline,
/// `binary` writes the raw bytes only.
pub fn render(value: &Value, format: &str, out: &mut impl Write) -> Result<()> {
    match format {
        "yaml" => writeln!(out, "{}", yaml_string(value))?,
        "json" => writeln!(out, "{}", serde_json::to_string(value)?)?,
        "s" => writeln!(out, "{}", value.display_string())?,
        "binary" => out.write_all(&binary_bytes(value)?)?,
        other => bail!("unknown render format '{other}', expected s/json/yaml/binary"),
    }
    Ok(())
}

fn binary_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Binary(bytes) => Ok(bytes.clone()),
        Value::String(s) => BASE64
            .decode(s.as_bytes())
            .context("binary rendering expects a base64 string"),
        Value::Array(items) => items
            .iter()
            .map(|v| match v.as_int() {
                Some(b @ 0..=255) => Ok(b as u8),
                _ => bail!("binary rendering expects byte values 0-255"),
            })
            .collect(),
        other => bail!("cannot render {} as binary", other.kind()),
    }
}

/// Block-style YAML rendering with a stable, minimal quoting policy:
/// strings are quoted only when they would otherwise parse as something
/// else or contain structural characters.
fn yaml_string(value: &Value) -> String {
    let mut out = String::new();
    emit(value, 0, &mut out);
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

fn emit(value: &Value, indent: usize, out: &mut String) {
    match value {
        Value::Map(m) if m.is_empty() => push_line(out, indent, "{}"),
        Value::Array(a) if a.is_empty() => push_line(out, indent, "[]"),
        Value::Map(m) => {
            for (k, v) in m {
                match v {
                    Value::Map(inner) if !inner.is_empty() => {
                        push_line(out, indent, &format!("{}:", scalar_token_key(k)));
                        emit(v, indent + 1, out);
                    }
                    Value::Array(inner) if !inner.is_empty() => {
                        push_line(out, indent, &format!("{}:", scalar_token_key(k)));
                        emit(v, indent + 1, out);
                    }
                    _ => push_line(
                        out,
                        indent,
                        &format!("{}: {}", scalar_token_key(k), scalar_token(v)),
                    ),
                }
            }
        }
        Value::Array(a) => {
            for v in a {
                match v {
                    Value::Map(inner) if !inner.is_empty() => {
                        push_line(out, indent, "-");
                        emit(v, indent + 1, out);
                    }
                    Value::Array(inner) if !inner.is_empty() => {
                        push_line(out, indent, "-");
                        emit(v, indent + 1, out);
                    }
                    _ => push_line(out, indent, &format!("- {}", scalar_token(v))),
                }
            }
        }
        scalar => push_line(out, indent, &scalar_token(scalar)),
    }
}

fn push_line(out: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(line);
    out.push('\n');
}

fn scalar_token_key(key: &str) -> String {
    quote_if_needed(key)
}

fn scalar_token(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => quote_if_needed(s),
        Value::Binary(b) => quote(&BASE64.encode(b)),
        Value::Map(_) => "{}".to_owned(),
        Value::Array(_) => "[]".to_owned(),
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_default()
}

fn quote_if_needed(s: &str) -> String {
    if needs_quoting(s) {
        quote(s)
    } else {
        s.to_owned()
    }
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() || s.trim() != s {
        return true;
    }
    if s.parse::<i64>().is_ok() || s.parse::<f64>().is_ok() {
        return true;
    }
    if matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off"
    ) {
        return true;
    }
    let first = s.chars().next().unwrap_or(' ');
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        return true;
    }
    s.contains(": ") || s.ends_with(':') || s.contains(" #") || s.contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(json: &str) -> String {
        let v: Value = serde_json::from_str(json).unwrap();
        yaml_string(&v)
    }

    #[test]
    fn scalars() {
        assert_eq!(yaml("23"), "23");
        assert_eq!(yaml("null"), "null");
        assert_eq!(yaml("true"), "true");
        assert_eq!(yaml(r#""a""#), "a");
        // Strings that would parse as something else get quoted.
        assert_eq!(yaml(r#""23""#), "\"23\"");
        assert_eq!(yaml(r#""""#), "\"\"");
        assert_eq!(yaml(r#""true""#), "\"true\"");
    }

    #[test]
    fn flat_map() {
        assert_eq!(yaml(r#"{"x":"a","y":9}"#), "x: a\ny: 9");
    }

    #[test]
    fn nested_map_and_array() {
        assert_eq!(
            yaml(r#"{"one":1,"three":{"a":"A"},"list":["x","y"]}"#),
            "one: 1\nthree:\n  a: A\nlist:\n  - x\n  - y"
        );
    }

    #[test]
    fn empty_containers() {
        assert_eq!(yaml("{}"), "{}");
        assert_eq!(yaml(r#"{"empty":{},"x":1}"#), "empty: {}\nx: 1");
        assert_eq!(yaml(r#"[{}]"#), "- {}");
    }

    #[test]
    fn strings_with_structure_are_quoted() {
        assert_eq!(yaml(r#""a: b""#), "\"a: b\"");
        assert_eq!(yaml(r#""plain words.""#), "plain words.");
    }

    #[test]
    fn json_render_is_compact_and_ordered() {
        let v: Value = serde_json::from_str(r#"{"x":"a","y":9}"#).unwrap();
        let mut out = Vec::new();
        render(&v, "json", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"x\":\"a\",\"y\":9}\n");
    }

    #[test]
    fn binary_render_decodes_base64_strings() {
        let v = Value::from("YWJjMTIzIT8kKiYoKSctPUB+");
        let mut out = Vec::new();
        render(&v, "binary", &mut out).unwrap();
        assert_eq!(out, b"abc123!?$*&()'-=@~");
    }

    #[test]
    fn binary_render_accepts_byte_arrays() {
        let v: Value = serde_json::from_str("[12,28,37,15]").unwrap();
        let mut out = Vec::new();
        render(&v, "binary", &mut out).unwrap();
        assert_eq!(out, [12, 28, 37, 15]);
    }

    #[test]
    fn unknown_format_is_an_error() {
        let mut out = Vec::new();
        assert!(render(&Value::Null, "toml", &mut out).is_err());
    }
}
