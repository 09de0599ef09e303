//! Structural fingerprinting of JSON payloads.
//!
//! Uses blake3 over the sorted multiset of `(json-path, leaf-type)` pairs,
//! with no leaf values contributing to the hash. Two payloads with the same
//! shape — same paths, same leaf types — always fingerprint identically
//! regardless of the data they carry.

use serde_json::Value;

/// A JSON leaf or container type, used only for fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

/// Walk `value`, collecting `(path, leaf-type)` pairs for every node
/// (containers included, so an empty array/object still contributes a
/// distinguishing pair).
fn collect_paths(value: &Value, path: &str, out: &mut Vec<(String, JsonType)>) {
    out.push((path.to_string(), JsonType::of(value)));
    match value {
        Value::Array(items) => {
            for item in items {
                collect_paths(item, &format!("{path}[]"), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_paths(item, &format!("{path}.{key}"), out);
            }
        }
        _ => {}
    }
}

/// Compute the structural fingerprint of a payload: a stable hash of the
/// sorted multiset of `(json-path, leaf-type)` pairs. Field order and leaf
/// values never influence the result.
pub fn structural_fingerprint(payload: &Value) -> String {
    let mut pairs = Vec::new();
    collect_paths(payload, "$", &mut pairs);
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut hasher = blake3::Hasher::new();
    for (path, ty) in &pairs {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(ty.tag().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Compute the extended fingerprint used when a mapping declares
/// `event_field_expressions`: the structural fingerprint combined with the
/// evaluated values of those expressions.
pub fn extended_fingerprint(structural: &str, field_values: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(structural.as_bytes());
    for value in field_values {
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_shapes_fingerprint_equal() {
        let a = json!({"action": "opened", "pull_request": {"number": 1}});
        let b = json!({"action": "closed", "pull_request": {"number": 999}});
        assert_eq!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn differing_shapes_fingerprint_unequal() {
        let a = json!({"action": "opened"});
        let b = json!({"action": "opened", "extra": true});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn leaf_type_difference_changes_fingerprint() {
        let a = json!({"id": 1});
        let b = json!({"id": "1"});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn extended_fingerprint_differs_by_field_values() {
        let structural = structural_fingerprint(&json!({"action": "x"}));
        let f1 = extended_fingerprint(&structural, &["opened".to_string()]);
        let f2 = extended_fingerprint(&structural, &["closed".to_string()]);
        assert_ne!(f1, f2);
    }

    proptest::proptest! {
        #[test]
        fn fingerprint_is_deterministic(a in 0i64..1000, b in "[a-z]{1,8}") {
            let payload = json!({"a": a, "b": b});
            let f1 = structural_fingerprint(&payload);
            let f2 = structural_fingerprint(&payload);
            proptest::prop_assert_eq!(f1, f2);
        }
    }
}
