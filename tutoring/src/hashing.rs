//! Deterministic hashing for generation cache keys.
//!
//! Canonical JSON serialization (object keys sorted ascending, arrays in
//! order) followed by FNV-1a 32-bit. Equal payloads hash identically
//! regardless of key insertion order, which is what makes generation caching
//! idempotent and audit replays bit-reproducible.

use serde_json::Value;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// Prefix identifying the hash algorithm in persisted keys.
pub const HASH_PREFIX: &str = "fnv1a32";

/// Serialize a JSON value to canonical text.
///
/// Object keys are sorted ascending by byte order at every nesting level;
/// arrays keep their order; no insignificant whitespace is emitted. Two
/// structurally equal values always produce byte-identical output.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on Value::String produces a correctly escaped JSON
                // string literal.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
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

/// FNV-1a 32-bit hash over UTF-8 bytes.
pub fn fnv1a_32(text: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in text.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hash text to an 8-character lowercase hex string.
pub fn stable_hash(text: &str) -> String {
    format!("{:08x}", fnv1a_32(text))
}

/// Hash an arbitrary payload into the persisted key format
/// `fnv1a32:{8-hex}`.
pub fn create_input_hash(payload: &Value) -> String {
    format!("{}:{}", HASH_PREFIX, stable_hash(&stable_stringify(payload)))
}
