//! # Canonical JSON
//!
//! The signing format for heartbeats and usage records: keys sorted
//! lexicographically at every level, no insignificant whitespace. Encoding
//! the same value twice yields byte-identical output, so a decoded heartbeat
//! re-encodes to exactly the bytes its signature covers.

use crate::CryptoError;
use serde::Serialize;
use serde_json::Value;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let value = serde_json::to_value(value)
        .map_err(|e| CryptoError::CanonicalizationFailed(e.to_string()))?;
    let mut out = Vec::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

/// Serialize a value to a canonical JSON string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    let bytes = to_canonical_bytes(value)?;
    // write_canonical only emits output of serde_json serializations, which
    // are valid UTF-8.
    String::from_utf8(bytes).map_err(|e| CryptoError::CanonicalizationFailed(e.to_string()))
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Key serialization via serde_json handles escaping.
                out.extend_from_slice(
                    serde_json::to_string(key).unwrap_or_default().as_bytes(),
                );
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
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
        // Scalars have a single serde_json rendering.
        scalar => {
            out.extend_from_slice(serde_json::to_string(scalar).unwrap_or_default().as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted() {
        let value = json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        let s = to_canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"alpha":2,"mid":{"a":2,"b":1},"zeta":1}"#);
    }

    #[test]
    fn test_no_whitespace() {
        let value = json!({"a": [1, 2, 3], "b": "x y"});
        let s = to_canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"a":[1,2,3],"b":"x y"}"#);
    }

    #[test]
    fn test_byte_identical_round_trip() {
        let value = json!({"nodeId": "n1", "sequence": 5, "metrics": {"cpuUtil": 0.5}});
        let first = to_canonical_bytes(&value).unwrap();
        let reparsed: Value = serde_json::from_slice(&first).unwrap();
        let second = to_canonical_bytes(&reparsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"k\"ey": "va\"lue"});
        let s = to_canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"k\"ey":"va\"lue"}"#);
    }
}
