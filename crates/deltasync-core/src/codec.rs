//! Deterministic CBOR encoding for stored records.
//!
//! Commit records and map payloads are content-addressed, so the same
//! logical record must always produce the same bytes:
//! - map keys sorted by encoded byte comparison
//! - integers use the smallest valid encoding
//! - definite lengths only
//! - no floats
//!
//! Decoding re-encodes the parsed value and rejects input that does not
//! round-trip byte-for-byte, so a tampered or truncated record is reported
//! as a decoding error rather than silently reinterpreted.

use bytes::Bytes;
use ciborium::value::{Integer, Value};

use crate::error::{CoreError, Result};
use crate::map::VersionedMap;

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Decode bytes that must be in canonical form.
pub fn decode_canonical(bytes: &[u8]) -> Result<Value> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::Decoding(e.to_string()))?;
    if encode_canonical(&value)? != bytes {
        return Err(CoreError::Decoding("record is not canonically encoded".into()));
    }
    Ok(value)
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::Encoding("floats not supported in canonical encoding".into()))
        }
        _ => return Err(CoreError::Encoding("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<()> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map with keys sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

/// Encode a map snapshot's entries as an array of `[key, value]` pairs in
/// key order.
pub fn encode_map_payload(map: &VersionedMap) -> Result<Vec<u8>> {
    let entries = map
        .iter()
        .map(|(k, v)| Value::Array(vec![Value::Text(k.to_string()), Value::Bytes(v.to_vec())]))
        .collect();
    encode_canonical(&Value::Array(entries))
}

/// Decode a map payload written by [`encode_map_payload`].
///
/// The checksum of the returned map is recomputed from its entries.
pub fn decode_map_payload(bytes: &[u8]) -> Result<VersionedMap> {
    let Value::Array(items) = decode_canonical(bytes)? else {
        return Err(CoreError::Decoding("map payload: expected array".into()));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                Ok([Value::Text(key), Value::Bytes(value)]) => {
                    entries.push((key, Bytes::from(value)))
                }
                _ => return Err(CoreError::Decoding("map payload: malformed entry".into())),
            },
            _ => return Err(CoreError::Decoding("map payload: expected entry pair".into())),
        }
    }

    VersionedMap::from_canonical_entries(entries)
}
