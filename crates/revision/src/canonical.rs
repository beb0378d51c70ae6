use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// JSON bytes with object keys sorted at every level.
pub fn stable_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let raw = serde_json::to_value(value)?;
    serde_json::to_vec(&normalize(raw))
}

/// Hex SHA-256 of `domain`, a NUL separator, then the canonical encoding of `value`.
pub fn domain_hash_hex<T: Serialize>(domain: &str, value: &T) -> Result<String, serde_json::Error> {
    let bytes = stable_json_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update([0u8]);
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().map(|(k, v)| (k, normalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted_recursively() {
        let v = json!({ "z": 1, "a": { "d": 4, "b": 2 }, "arr": [ { "k2": 2, "k1": 1 } ] });
        let text = String::from_utf8(stable_json_bytes(&v).unwrap()).unwrap();
        assert_eq!(text, r#"{"a":{"b":2,"d":4},"arr":[{"k1":1,"k2":2}],"z":1}"#);
    }

    #[test]
    fn domain_separates_equal_payloads() {
        let v = json!({ "a": 1 });
        let a = domain_hash_hex("one", &v).unwrap();
        let b = domain_hash_hex("two", &v).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, domain_hash_hex("one", &json!({ "a": 1 })).unwrap());
    }
}
