//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 seconds)
//!
//! Everything that is hashed (conjunctions) or embedded in the ciphertext
//! container header (the hidden policy) goes through this encoder, so the
//! same policy produces identical bytes across platforms and restarts.

use ciborium::value::Value;

use crate::attributes::{AttributeRequest, Conjunction};
use crate::error::CoreError;
use crate::policy::{Policy, PolicyEntry, RecipientId};

/// Attribute map keys (integer keys for compact encoding).
mod attr_keys {
    pub const ATYPE: u64 = 0;
    pub const VALUE: u64 = 1;
}

/// Policy entry map keys.
mod entry_keys {
    pub const TIMESTAMP: u64 = 0;
    pub const CONJUNCTION: u64 = 1;
}

/// Encode a conjunction to canonical CBOR bytes.
///
/// Callers hashing the result must pass the canonical (sorted) form;
/// this function encodes attributes in the order given.
pub fn canonical_conjunction_bytes(con: &Conjunction) -> Vec<u8> {
    let value = conjunction_to_value(con);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Encode a full recipient policy map to canonical CBOR bytes.
pub fn canonical_policy_bytes(policy: &Policy) -> Vec<u8> {
    let value = policy_to_value(policy);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Convert an attribute request to a CBOR value (map with integer keys).
fn attribute_to_value(attr: &AttributeRequest) -> Value {
    let value = match &attr.value {
        Some(v) => Value::Text(v.clone()),
        None => Value::Null,
    };
    Value::Map(vec![
        (
            Value::Integer(attr_keys::ATYPE.into()),
            Value::Text(attr.atype.clone()),
        ),
        (Value::Integer(attr_keys::VALUE.into()), value),
    ])
}

/// Convert a conjunction to a CBOR array value.
pub(crate) fn conjunction_to_value(con: &Conjunction) -> Value {
    Value::Array(con.iter().map(attribute_to_value).collect())
}

/// Convert a policy entry to a CBOR value.
pub(crate) fn entry_to_value(entry: &PolicyEntry) -> Value {
    Value::Map(vec![
        (
            Value::Integer(entry_keys::TIMESTAMP.into()),
            Value::Integer(entry.timestamp.into()),
        ),
        (
            Value::Integer(entry_keys::CONJUNCTION.into()),
            conjunction_to_value(&entry.conjunction),
        ),
    ])
}

/// Convert a policy to a CBOR map keyed by recipient id.
pub(crate) fn policy_to_value(policy: &Policy) -> Value {
    let entries = policy
        .iter()
        .map(|(id, entry)| (Value::Text(id.as_str().to_owned()), entry_to_value(entry)))
        .collect();
    Value::Map(entries)
}

/// Parse an attribute request from a CBOR value.
fn value_to_attribute(value: &Value) -> Result<AttributeRequest, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::Decoding("expected attribute map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let atype = match get(attr_keys::ATYPE) {
        Some(Value::Text(s)) => s.clone(),
        _ => return Err(CoreError::Decoding("missing attribute type".into())),
    };

    let value = match get(attr_keys::VALUE) {
        Some(Value::Text(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::Decoding("invalid attribute value".into())),
    };

    Ok(AttributeRequest { atype, value })
}

/// Parse a conjunction from a CBOR value.
pub(crate) fn value_to_conjunction(value: &Value) -> Result<Conjunction, CoreError> {
    let arr = match value {
        Value::Array(a) => a,
        _ => return Err(CoreError::Decoding("expected conjunction array".into())),
    };
    arr.iter().map(value_to_attribute).collect::<Result<_, _>>()
}

/// Parse a policy entry from a CBOR value.
pub(crate) fn value_to_entry(value: &Value) -> Result<PolicyEntry, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::Decoding("expected policy entry map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let timestamp = match get(entry_keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i128::from(*i) as i64,
        _ => return Err(CoreError::Decoding("missing policy timestamp".into())),
    };

    let conjunction = match get(entry_keys::CONJUNCTION) {
        Some(v) => value_to_conjunction(v)?,
        None => return Err(CoreError::Decoding("missing policy conjunction".into())),
    };

    Ok(PolicyEntry {
        timestamp,
        conjunction,
    })
}

/// Parse a policy from a CBOR value.
pub(crate) fn value_to_policy(value: &Value) -> Result<Policy, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::Decoding("expected policy map".into())),
    };

    let mut policy = Policy::new();
    for (key, entry) in map {
        let id = match key {
            Value::Text(s) => RecipientId::canonicalize(s),
            _ => return Err(CoreError::Decoding("invalid recipient key".into())),
        };
        policy.insert(id, value_to_entry(entry)?);
    }
    Ok(policy)
}

/// Recursively encode a CBOR value with canonical rules.
pub(crate) fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            let n = i128::from(*i);
            if n >= 0 {
                encode_uint(buf, 0, n as u64);
            } else {
                // CBOR encodes -1 as 0, -2 as 1, etc.
                encode_uint(buf, 1, (-1 - n) as u64);
            }
        }
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        _ => {
            // Floats and tags never occur in our data model.
            unreachable!("unsupported CBOR value in canonical encoding");
        }
    }
}

/// Encode an unsigned integer with the given major type, smallest form.
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

/// Encode a map canonically: keys sorted by encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
