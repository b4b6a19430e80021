//! Canonical JSON encoding for map values.
//!
//! Two byte encodings of the same logical JSON value must checksum
//! identically, so every value is canonicalized before it is stored or
//! folded into a checksum:
//! - object keys sorted by UTF-8 byte order, recursively
//! - no insignificant whitespace
//! - floats with no fractional part that fit in an integer render as integers
//!   (`1.0`, `1e0` and `1` are the same value)

use bytes::Bytes;
use serde_json::{Map, Number, Value};

/// Parse raw JSON bytes and return their canonical encoding.
pub fn canonicalize(raw: &[u8]) -> Result<Bytes, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    to_canonical_bytes(value)
}

/// Encode an already-parsed value canonically.
pub fn to_canonical_bytes(value: Value) -> Result<Bytes, serde_json::Error> {
    let canon = canon_value(value);
    Ok(Bytes::from(serde_json::to_vec(&canon)?))
}

fn canon_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut canon = Map::new();
            for (key, value) in entries {
                canon.insert(key, canon_value(value));
            }
            Value::Object(canon)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canon_value).collect()),
        Value::Number(n) => Value::Number(canon_number(n)),
        other => other,
    }
}

fn canon_number(n: Number) -> Number {
    if !n.is_f64() {
        return n;
    }
    let Some(f) = n.as_f64() else {
        return n;
    };
    if f.fract() != 0.0 {
        return n;
    }
    // 2^63 and 2^64 are exact in f64; both bounds are exclusive.
    if f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        return Number::from(f as i64);
    }
    if f >= 0.0 && f < 18_446_744_073_709_551_616.0 {
        return Number::from(f as u64);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        String::from_utf8(canonicalize(s.as_bytes()).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_sorts_keys_recursively() {
        assert_eq!(
            canon(r#"{"b": 1, "a": {"d": 4, "c": [ {"z":0,"y":1} ]}}"#),
            r#"{"a":{"c":[{"y":1,"z":0}],"d":4},"b":1}"#
        );
    }

    #[test]
    fn test_equivalent_encodings_converge() {
        assert_eq!(canon("1.0"), "1");
        assert_eq!(canon("1e2"), "100");
        assert_eq!(canon("-0.0"), "0");
        assert_eq!(canon("1.5"), "1.5");
        assert_eq!(canon(" \"bar\" "), "\"bar\"");
        assert_eq!(canon("[1, 2.0]"), "[1,2]");
    }

    #[test]
    fn test_large_integers_preserved() {
        assert_eq!(canon("18446744073709551615"), "18446744073709551615");
        assert_eq!(canon("-9223372036854775808"), "-9223372036854775808");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(canonicalize(b"{").is_err());
        assert!(canonicalize(b"").is_err());
        assert!(canonicalize(b"1 2").is_err());
        assert!(canonicalize(b"NaN").is_err());
    }
}
