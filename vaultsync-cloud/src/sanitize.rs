//! Payload and name sanitization.
//!
//! The remote store rejects documents containing the "missing value"
//! sentinel, so payloads are scrubbed before upload. Child collection and
//! document names become remote path segments and are reduced to a
//! conservative character set.

use serde_json::{Map, Value};

/// Sentinel marking a value as missing (distinct from JSON `null`).
pub const MISSING_SENTINEL: &str = "__missing__";

/// Placeholder for characters outside the name allow-list.
const NAME_PLACEHOLDER: char = '-';

/// Returns the missing-value sentinel.
pub fn missing() -> Value {
    Value::String(MISSING_SENTINEL.to_string())
}

/// True if the value is the missing-value sentinel.
pub fn is_missing(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == MISSING_SENTINEL)
}

/// Recursively strips missing-value sentinels from a payload.
///
/// Object entries holding the sentinel are dropped. Array elements holding
/// the sentinel are replaced with `null` instead: dropping them would shift
/// the indices of the remaining elements, which callers rely on.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(_, v)| !is_missing(v))
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| if is_missing(v) { Value::Null } else { sanitize(v) })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Reduces a child collection or document name to a well-formed remote
/// path segment.
///
/// `".."` sequences are removed first (path traversal), then every
/// character outside `[A-Za-z0-9_.-]` is replaced with `'-'`. Distinct
/// inputs may collide after sanitization ("a/b" and "a:b" both become
/// "a-b"); colliding names address the same remote location.
pub fn sanitize_name(name: &str) -> String {
    let mut stripped = name.to_string();
    while stripped.contains("..") {
        stripped = stripped.replace("..", "");
    }

    let sanitized: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                NAME_PLACEHOLDER
            }
        })
        .collect();

    if sanitized.is_empty() {
        NAME_PLACEHOLDER.to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_entries_are_dropped() {
        let payload = json!({ "a": missing(), "b": 1 });
        assert_eq!(sanitize(&payload), json!({ "b": 1 }));
    }

    #[test]
    fn array_elements_become_null() {
        let payload = json!([1, missing(), 3]);
        assert_eq!(sanitize(&payload), json!([1, null, 3]));
    }

    #[test]
    fn traversal_sequences_are_removed() {
        assert_eq!(sanitize_name("logs/../x"), "logs--x");
    }

    #[test]
    fn empty_input_gets_a_placeholder() {
        assert_eq!(sanitize_name(""), "-");
        assert_eq!(sanitize_name(".."), "-");
    }
}
