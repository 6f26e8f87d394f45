//! Cache key derivation and ETag digests

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies one logical upstream query
///
/// Built from a canonical JSON serialization of the effective query parameters,
/// so two requests that differ only in object key order map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from a set of named query fields
    ///
    /// Fields whose value is `None` are left out entirely rather than written as
    /// `null`, so a request that omits an optional field and one that never had
    /// it produce the same key.
    pub fn from_fields<'a, I>(namespace: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<Value>)>,
    {
        let mut map = Map::new();
        for (name, value) in fields {
            if let Some(value) = value {
                map.insert(name.to_string(), value);
            }
        }
        let canonical = canonical_json(&Value::Object(map));
        Self(format!("{}:{}", namespace, canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializes a JSON value with object keys sorted at every depth
///
/// Array order is preserved since it is meaningful (e.g. sort precedence).
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            let mut out = Map::new();
            for name in names {
                out.insert(name.clone(), sorted(&map[name]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Computes a short content digest used as an ETag
///
/// Hex of the first 8 bytes of SHA-256 over the value's canonical JSON. Equal
/// content always yields an equal tag. Not intended as a cryptographic check.
pub fn digest_etag<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = canonical_json(&serde_json::to_value(value)?);
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(&hasher.finalize()[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ignores_object_key_order() {
        let a: Value = serde_json::from_str(
            r#"{"property": "Status", "select": {"equals": "Done", "mode": "exact"}}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"select": {"mode": "exact", "equals": "Done"}, "property": "Status"}"#,
        )
        .unwrap();

        let key_a = CacheKey::from_fields(
            "documents",
            [("page_size", Some(json!(10))), ("filter", Some(a))],
        );
        let key_b = CacheKey::from_fields(
            "documents",
            [("filter", Some(b)), ("page_size", Some(json!(10)))],
        );

        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_missing_field_is_omitted_not_null() {
        let omitted = CacheKey::from_fields(
            "documents",
            [("page_size", Some(json!(10))), ("start_cursor", None)],
        );
        let absent = CacheKey::from_fields("documents", [("page_size", Some(json!(10)))]);

        assert_eq!(omitted, absent);
        assert!(!omitted.as_str().contains("null"));
    }

    #[test]
    fn test_array_order_is_significant() {
        let first = CacheKey::from_fields(
            "documents",
            [("sorts", Some(json!([{"property": "A"}, {"property": "B"}])))],
        );
        let second = CacheKey::from_fields(
            "documents",
            [("sorts", Some(json!([{"property": "B"}, {"property": "A"}])))],
        );

        assert_ne!(first, second);
    }

    #[test]
    fn test_namespace_separates_keys() {
        let a = CacheKey::from_fields("documents", [("page_size", Some(json!(1)))]);
        let b = CacheKey::from_fields("telemetry", [("page_size", Some(json!(1)))]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_is_deterministic_and_short() {
        let body = json!({"results": [{"id": "1"}], "has_more": false});
        let first = digest_etag(&body).unwrap();
        let second = digest_etag(&body.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = digest_etag(&json!({"results": [1]})).unwrap();
        let b = digest_etag(&json!({"results": [2]})).unwrap();
        assert_ne!(a, b);
    }
}
