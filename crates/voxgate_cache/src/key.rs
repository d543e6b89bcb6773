//! Deterministic cache keys.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest (lowercase hex) of a normalised synthesis request.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use voxgate_cache::CacheKey;
///
/// let a = CacheKey::compute("Lira", "alloy", "wav", "tts-1", &json!({"speed": 1.0, "pitch": 2}));
/// let b = CacheKey::compute("Lira", "alloy", "wav", "tts-1", &json!({"pitch": 2, "speed": 1.0}));
/// let c = CacheKey::compute("lira", "alloy", "wav", "tts-1", &json!({"pitch": 2, "speed": 1.0}));
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the request tuple.
    ///
    /// Text is hashed verbatim (case-sensitive). `extra_params` is serialised
    /// as canonical JSON with object keys sorted at every depth. Each field is
    /// length-prefixed so no two distinct tuples produce the same byte stream.
    pub fn compute(
        text: &str,
        voice_id: &str,
        format: &str,
        model: &str,
        extra_params: &JsonValue,
    ) -> Self {
        let mut hasher = Sha256::new();
        let mut canonical = String::new();
        write_canonical(extra_params, &mut canonical);

        for field in [text, voice_id, format, model, canonical.as_str()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialise JSON with sorted object keys, independent of map ordering features.
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
