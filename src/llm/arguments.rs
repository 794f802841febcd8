//! Tolerant parsing of tool-call argument text.
//!
//! Vendors stream tool arguments as JSON text fragments, and models do not
//! always produce valid JSON: fenced code blocks, trailing commas, prose
//! around the object. [`reconcile`] turns whatever arrived into a key/value
//! mapping, or an empty mapping plus a diagnostic. It never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?\s*```\s*$")
        .expect("fence pattern is a valid literal regex")
});

/// Outcome of reconciling raw argument text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciled {
    /// Parsed arguments, empty when parsing failed
    pub arguments: Map<String, Value>,
    /// Human-readable diagnostic when parsing failed
    pub error: Option<String>,
}

impl Reconciled {
    fn parsed(arguments: Map<String, Value>) -> Self {
        Self {
            arguments,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            arguments: Map::new(),
            error: Some(error),
        }
    }
}

enum Attempt {
    Object(Map<String, Value>),
    NotAnObject(&'static str),
    Invalid(String),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn classify(value: Value) -> Attempt {
    match value {
        Value::Object(map) => Attempt::Object(map),
        other => Attempt::NotAnObject(json_kind(&other)),
    }
}

fn parse_strict(text: &str) -> Attempt {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => classify(value),
        Err(e) => Attempt::Invalid(e.to_string()),
    }
}

fn parse_lenient(text: &str) -> Attempt {
    match json5::from_str::<Value>(text) {
        Ok(value) => classify(value),
        Err(e) => Attempt::Invalid(e.to_string()),
    }
}

/// Remove a surrounding fenced-code wrapper, if any
fn strip_fence(raw: &str) -> &str {
    let captured = FENCE.captures(raw).and_then(|caps| caps.get(1));
    match captured {
        Some(body) => body.as_str(),
        None => raw,
    }
}

/// The substring from the first `{` to the last `}`, inclusive
fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse raw tool-argument text into a key/value mapping.
///
/// Empty or whitespace-only input yields an empty mapping with no error.
/// Otherwise the first of these that yields an object wins: strict JSON,
/// lenient JSON5, then both again on the outermost `{...}` substring.
pub fn reconcile(raw: &str) -> Reconciled {
    if raw.trim().is_empty() {
        return Reconciled::default();
    }

    let body = strip_fence(raw).trim();
    let mut candidates = vec![body];
    if let Some(slice) = brace_slice(body) {
        if slice != body {
            candidates.push(slice);
        }
    }

    let mut wrong_shape: Option<&'static str> = None;
    let mut first_error: Option<String> = None;

    for candidate in candidates {
        for attempt in [parse_strict(candidate), parse_lenient(candidate)] {
            match attempt {
                Attempt::Object(map) => return Reconciled::parsed(map),
                Attempt::NotAnObject(kind) => {
                    wrong_shape.get_or_insert(kind);
                }
                Attempt::Invalid(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    let message = match (wrong_shape, first_error) {
        (Some(kind), _) => format!("Tool arguments must be a JSON object, got {}", kind),
        (None, Some(e)) => format!("Failed to parse tool arguments: {}", e),
        (None, None) => "Failed to parse tool arguments".to_string(),
    };
    tracing::debug!("🔧 Argument reconciliation failed: {}", message);
    Reconciled::failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_empty_input_is_empty_object_without_error() {
        assert_eq!(reconcile(""), Reconciled::default());
        assert_eq!(reconcile("   \n\t"), Reconciled::default());
    }

    #[test]
    fn test_well_formed_object_round_trips() {
        let input = json!({"path": "/tmp/x", "limit": 10, "nested": {"a": [1, 2, 3]}, "flag": true});
        let result = reconcile(&input.to_string());
        assert_eq!(result.error, None);
        assert_eq!(result.arguments, object(input));
    }

    #[test]
    fn test_fence_pattern_compiles() {
        Lazy::force(&FENCE);
    }

    #[test]
    fn test_fenced_json_is_unwrapped() {
        let result = reconcile("```json\n{\"x\":1}\n```");
        assert_eq!(result.error, None);
        assert_eq!(result.arguments, object(json!({"x": 1})));

        let result = reconcile("```\n{\"x\":1}\n```");
        assert_eq!(result.arguments, object(json!({"x": 1})));
    }

    #[test]
    fn test_lenient_parse_accepts_trailing_commas_and_bare_keys() {
        let result = reconcile("{query: 'rust', limit: 3,}");
        assert_eq!(result.error, None);
        assert_eq!(result.arguments, object(json!({"query": "rust", "limit": 3})));
    }

    #[test]
    fn test_object_embedded_in_prose_is_extracted() {
        let result = reconcile("Sure! Here are the arguments: {\"city\": \"Paris\"} hope that helps");
        assert_eq!(result.error, None);
        assert_eq!(result.arguments, object(json!({"city": "Paris"})));
    }

    #[test]
    fn test_not_json_yields_empty_object_and_error() {
        let result = reconcile("not json at all");
        assert!(result.arguments.is_empty());
        let error = result.error.unwrap();
        assert!(!error.is_empty());
    }

    #[test]
    fn test_non_object_yields_error() {
        let result = reconcile("[1, 2, 3]");
        assert!(result.arguments.is_empty());
        assert!(result.error.unwrap().contains("an array"));

        let result = reconcile("\"just a string\"");
        assert!(result.arguments.is_empty());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_truncated_object_yields_error() {
        let result = reconcile("{\"path\": \"/tmp");
        assert!(result.arguments.is_empty());
        assert!(result.error.is_some());
    }
}
