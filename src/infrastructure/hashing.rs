//! Deterministic content hashing for cache keys and dedup.
//!
//! Keys are SHA-256 over a canonical byte serialization of
//! `(namespace, payload)`. Canonical form sorts object keys recursively
//! and strips insignificant whitespace, so argument reordering never
//! causes a cache miss. Namespaces are length-prefixed before the
//! payload so identical payloads under different namespaces never alias.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::models::ids::CacheKey;

/// Serialize a JSON value to canonical bytes: objects sorted by key,
/// compact separators.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => {
            out.extend_from_slice(value.to_string().as_bytes());
        }
        Value::String(s) => {
            out.extend_from_slice(Value::String(s.clone()).to_string().as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(Value::String((*key).clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
    }
}

/// Hash raw payload bytes under a namespace.
pub fn content_hash(namespace: &str, payload: &[u8]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((namespace.len() as u64).to_be_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(payload);
    CacheKey(hex_encode(&hasher.finalize()))
}

/// Hash a structured payload under a namespace via its canonical form.
pub fn generate_cache_key(namespace: &str, payload: &Value) -> CacheKey {
    content_hash(namespace, &canonical_json_bytes(payload))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(generate_cache_key("test", &a), generate_cache_key("test", &b));
    }

    #[test]
    fn namespaces_never_alias() {
        let payload = json!({"q": "same"});
        assert_ne!(
            generate_cache_key("embeddings", &payload),
            generate_cache_key("classifications", &payload)
        );
        // Length-prefixing keeps ("ab","c") distinct from ("a","bc").
        assert_ne!(content_hash("ab", b"c"), content_hash("a", b"bc"));
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let payload = json!({"text": "urgent reboot required"});
        let k1 = generate_cache_key("classify", &payload);
        let k2 = generate_cache_key("classify", &payload);
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(generate_cache_key("t", &a), generate_cache_key("t", &b));
    }

    #[test]
    fn canonical_bytes_are_compact_and_sorted() {
        let v = json!({"z": 1, "a": [true, null]});
        let bytes = canonical_json_bytes(&v);
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":[true,null],"z":1}"#);
    }
}
