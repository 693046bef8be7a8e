//! Canonical CBOR encoding for signed statements.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Every signature in Cipherdrop is computed over `domain || canonical_cbor`,
//! so the same statement produces identical bytes on every platform.

use ciborium::value::Value;

use crate::crypto::Identity;
use crate::error::{CoreError, Result};
use crate::types::{CiphertextHandle, StorageLocation};

/// Domain separation prefix for input proofs.
pub const INPUT_PROOF_DOMAIN: &[u8] = b"cipherdrop/input-proof/v1";

/// Statement field keys (integer keys for compact encoding).
mod keys {
    pub const LOCATION: u64 = 0;
    pub const IDENTITY: u64 = 1;
    pub const HANDLE: u64 = 2;
}

/// Build the statement an input verifier signs to attest a handle.
///
/// Binds the handle to exactly one storage location and one identity, which
/// is what prevents a proof from being replayed by a different registrant.
pub fn input_statement(
    location: &StorageLocation,
    identity: &Identity,
    handle: &CiphertextHandle,
) -> Result<Vec<u8>> {
    let value = Value::Map(vec![
        (
            Value::Integer(keys::LOCATION.into()),
            Value::Bytes(location.0.to_vec()),
        ),
        (
            Value::Integer(keys::IDENTITY.into()),
            Value::Bytes(identity.0.to_vec()),
        ),
        (
            Value::Integer(keys::HANDLE.into()),
            Value::Bytes(handle.0.to_vec()),
        ),
    ]);
    signing_message(INPUT_PROOF_DOMAIN, &value)
}

/// Construct `domain || canonical(value)`.
pub fn signing_message(domain: &[u8], value: &Value) -> Result<Vec<u8>> {
    let body = encode_canonical(value)?;
    let mut msg = Vec::with_capacity(domain.len() + body.len());
    msg.extend_from_slice(domain);
    msg.extend_from_slice(&body);
    Ok(msg)
}

/// Encode a CBOR Value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
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
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value type".into(),
            ))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

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

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError("duplicate map key".into()));
    }

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
