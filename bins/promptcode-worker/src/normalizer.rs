/// Dataset Normalizer - Canonical Entries for Comparison
///
/// **Core Responsibility:**
/// Turn an expected or model-produced JSON value into an ordered sequence of
/// comparable entries.
///
/// **Entry Rules:**
/// - Sequence: one entry per element
/// - Mapping: a single entry
/// - Scalar: a single entry
///
/// **Equality Rules:**
/// - Deep structural equality, object key order ignored
/// - Numbers compare by value (`1 == 1.0`)
/// - Strings never equal numbers unless `NumericEquality::Lenient`
///
/// Each entry carries a canonical key; two entries are equal iff their keys
/// are equal. The differ counts keys instead of comparing values pairwise.

use promptcode_common::config::NumericEquality;
use serde_json::{Number, Value};
use thiserror::Error;

/// Largest integer an f64 represents exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedOutputError {
    #[error("model response is empty")]
    Empty,

    #[error("model response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON array with one output per test case, got {0}")]
    NotAnArray(&'static str),

    #[error("expected {expected} outputs (one per test case), got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("no output was produced for this test case")]
    MissingOutput,
}

/// One comparable unit of a test case's output
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Value as it appeared, reported back in missing/extra lists
    pub value: Value,
    pub key: String,
}

impl Entry {
    pub fn new(value: &Value, mode: NumericEquality) -> Self {
        let mut key = String::new();
        write_canonical_key(value, mode, &mut key);
        Self {
            value: value.clone(),
            key,
        }
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Normalize any value into its entry sequence
pub fn normalize(value: &Value, mode: NumericEquality) -> Vec<Entry> {
    match value {
        Value::Array(items) => items.iter().map(|item| Entry::new(item, mode)).collect(),
        other => vec![Entry::new(other, mode)],
    }
}

/// Normalize a model-produced output for one test case.
///
/// A string holding a JSON array or object is decoded first, since models
/// occasionally double-encode their answer.
pub fn normalize_actual(
    actual: Option<&Value>,
    expected: &Value,
    mode: NumericEquality,
) -> Result<Vec<Entry>, MalformedOutputError> {
    let actual = match actual {
        None | Some(Value::Null) => return Err(MalformedOutputError::MissingOutput),
        Some(value) => value,
    };

    if let (Value::String(text), false) = (actual, expected.is_string()) {
        if let Ok(decoded @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(text.trim()) {
            return Ok(normalize(&decoded, mode));
        }
    }

    Ok(normalize(actual, mode))
}

/// Parse raw model text into a JSON value.
///
/// Plain JSON is taken as is. Otherwise the first Markdown code block is
/// used, wherever it appears in the text.
pub fn parse_model_response(raw: &str) -> Result<Value, MalformedOutputError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(MalformedOutputError::Empty);
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let body = fenced_block(text).unwrap_or(text);
    if body.is_empty() {
        return Err(MalformedOutputError::Empty);
    }
    serde_json::from_str(body).map_err(|e| MalformedOutputError::InvalidJson(e.to_string()))
}

/// Body of the first ``` block, or `None` when the text has no fence
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    // Drop the info string ("json", "JSON", ...) after the opening fence
    let info_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let body = &rest[info_len..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// Split a parsed batch response into one output per test case.
///
/// The response must be an array with exactly `total_cases` elements.
pub fn split_case_outputs(parsed: &Value, total_cases: usize) -> Result<Vec<Value>, MalformedOutputError> {
    match parsed {
        Value::Array(items) if items.len() == total_cases => Ok(items.clone()),
        Value::Array(items) => Err(MalformedOutputError::WrongLength {
            expected: total_cases,
            actual: items.len(),
        }),
        other => Err(MalformedOutputError::NotAnArray(json_type_name(other))),
    }
}

fn canonical_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::from(i);
    }
    if let Some(u) = n.as_u64() {
        return Value::from(u);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => Value::from(f as i64),
        _ => Value::Number(n.clone()),
    }
}

fn lenient_number(text: &str) -> Option<Value> {
    let f: f64 = text.trim().parse().ok()?;
    if !f.is_finite() {
        return None;
    }
    Number::from_f64(f).map(|n| canonical_number(&n))
}

/// Write a key that is equal for structurally equal values.
/// Object keys are sorted so insertion order never matters.
fn write_canonical_key(value: &Value, mode: NumericEquality, out: &mut String) {
    match value {
        Value::Number(n) => out.push_str(&canonical_number(n).to_string()),
        Value::String(s) if mode == NumericEquality::Lenient => match lenient_number(s) {
            Some(number) => out.push_str(&number.to_string()),
            None => out.push_str(&value.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_key(item, mode, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical_key(&map[k.as_str()], mode, out);
            }
            out.push('}');
        }
        Value::Null | Value::Bool(_) | Value::String(_) => out.push_str(&value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(value: Value) -> String {
        Entry::new(&value, NumericEquality::Strict).key
    }

    #[test]
    fn test_sequence_yields_one_entry_per_element() {
        let entries = normalize(&json!([{"a": 1}, {"a": 2}, 3]), NumericEquality::Strict);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].value, json!(3));
    }

    #[test]
    fn test_mapping_and_scalar_are_single_entries() {
        assert_eq!(normalize(&json!({"a": [1, 2]}), NumericEquality::Strict).len(), 1);
        assert_eq!(normalize(&json!("hello"), NumericEquality::Strict).len(), 1);
        assert_eq!(normalize(&json!(42), NumericEquality::Strict).len(), 1);
    }

    #[test]
    fn test_key_ignores_object_order() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": {"a": 3, "b": 2}, "x": 1}"#).unwrap();
        assert_eq!(key(a), key(b));
    }

    #[test]
    fn test_array_order_matters_inside_entries() {
        assert_ne!(key(json!({"tags": [1, 2]})), key(json!({"tags": [2, 1]})));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(key(json!(1)), key(json!(1.0)));
        assert_ne!(key(json!(1)), key(json!(1.5)));
        assert_eq!(key(json!({"n": -3})), key(json!({"n": -3.0})));
    }

    #[test]
    fn test_strict_mode_never_coerces_strings() {
        assert_ne!(key(json!(42)), key(json!("42")));
        assert_ne!(key(json!(true)), key(json!("true")));
    }

    #[test]
    fn test_lenient_mode_coerces_numeric_strings() {
        let lenient = |v: Value| Entry::new(&v, NumericEquality::Lenient).key;
        assert_eq!(lenient(json!({"n": "42"})), lenient(json!({"n": 42})));
        assert_eq!(lenient(json!(" 2.50 ")), lenient(json!(2.5)));
        assert_ne!(lenient(json!("forty-two")), lenient(json!(42)));
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        assert_eq!(parse_model_response("  [1, 2]\n").unwrap(), json!([1, 2]));
        assert_eq!(
            parse_model_response("```json\n[{\"a\": 1}]\n```").unwrap(),
            json!([{"a": 1}])
        );
        assert_eq!(parse_model_response("```\n{\"b\": 2}\n```\n").unwrap(), json!({"b": 2}));
    }

    #[test]
    fn test_parse_fence_after_preamble() {
        assert_eq!(
            parse_model_response("Here are the outputs:\n```json\n[[1]]\n```").unwrap(),
            json!([[1]])
        );
        assert_eq!(
            parse_model_response("Sure.\n```\n[[1], [2]]\n```\nLet me know if that helps.").unwrap(),
            json!([[1], [2]])
        );
    }

    #[test]
    fn test_parse_single_line_fence() {
        assert_eq!(parse_model_response("```json [[1]]```").unwrap(), json!([[1]]));
        assert_eq!(parse_model_response("```[[1]]```").unwrap(), json!([[1]]));
    }

    #[test]
    fn test_parse_backticks_inside_plain_json() {
        assert_eq!(parse_model_response(r#"["```"]"#).unwrap(), json!(["```"]));
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_model_response("   "), Err(MalformedOutputError::Empty));
        assert!(matches!(
            parse_model_response("Sure! Here is the answer: a, b"),
            Err(MalformedOutputError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_normalize_actual_missing() {
        let expected = json!([1]);
        assert_eq!(
            normalize_actual(None, &expected, NumericEquality::Strict),
            Err(MalformedOutputError::MissingOutput)
        );
        assert_eq!(
            normalize_actual(Some(&Value::Null), &expected, NumericEquality::Strict),
            Err(MalformedOutputError::MissingOutput)
        );
    }

    #[test]
    fn test_normalize_actual_decodes_embedded_json() {
        let expected = json!([{"a": 1}]);
        let actual = json!("[{\"a\": 1}, {\"a\": 2}]");
        let entries = normalize_actual(Some(&actual), &expected, NumericEquality::Strict).unwrap();
        assert_eq!(entries.len(), 2);

        // Expected strings are compared as strings
        let entries = normalize_actual(Some(&json!("[1]")), &json!("[1]"), NumericEquality::Strict).unwrap();
        assert_eq!(entries[0].value, json!("[1]"));
    }

    #[test]
    fn test_split_case_outputs() {
        let parsed = json!([[1], {"a": 2}]);
        assert_eq!(split_case_outputs(&parsed, 2).unwrap().len(), 2);
        assert_eq!(
            split_case_outputs(&parsed, 3),
            Err(MalformedOutputError::WrongLength { expected: 3, actual: 2 })
        );
        assert_eq!(
            split_case_outputs(&json!({"a": 1}), 1),
            Err(MalformedOutputError::NotAnArray("an object"))
        );
    }
}
