//! Ciphertext container prologue: the self-describing header that carries
//! the hidden policy.
//!
//! Layout: `b"MSEAL"` magic, one format version byte, u32-BE header
//! length, canonical-CBOR header (recipient id -> policy entry), then the
//! opaque sealed body. The header is parseable without touching the body,
//! which is what lets the unseal pipeline discover the hidden policy and
//! acquire a key before any decryption happens.

use bytes::{Bytes, BytesMut};
use ciborium::value::Value;

use crate::canonical::{encode_value_to, policy_to_value, value_to_policy};
use crate::chunk::ChunkReceiver;
use crate::error::CoreError;
use crate::policy::HiddenPolicy;

/// Container magic bytes.
pub const MAGIC: &[u8; 5] = b"MSEAL";

/// Current container format version.
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on the header length field. A header beyond this is
/// treated as malformed rather than buffered.
pub const MAX_HEADER_LEN: u32 = 1024 * 1024;

/// Fixed prologue prefix: magic + version + length field.
const PREFIX_LEN: usize = MAGIC.len() + 1 + 4;

/// Encode the container prologue (magic, version, length, header) for
/// the given hidden policy. The sealed body follows these bytes.
pub fn encode_prologue(policy: &HiddenPolicy) -> Vec<u8> {
    let mut header = Vec::new();
    encode_value_to(&mut header, &policy_to_value(policy));

    let mut out = Vec::with_capacity(PREFIX_LEN + header.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out
}

/// Result of parsing a prologue out of a byte prefix.
#[derive(Debug)]
enum ParseStep {
    /// More bytes are needed before a decision can be made.
    NeedMore,
    /// Prologue complete: policy plus the number of bytes consumed.
    Done(HiddenPolicy, usize),
}

/// Try to parse a prologue from the front of `buf`.
fn parse_prologue(buf: &[u8]) -> Result<ParseStep, CoreError> {
    if buf.len() < PREFIX_LEN {
        return Ok(ParseStep::NeedMore);
    }
    if &buf[..MAGIC.len()] != MAGIC {
        return Err(CoreError::MalformedContainer("bad magic".into()));
    }
    let version = buf[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let len_bytes: [u8; 4] = buf[MAGIC.len() + 1..PREFIX_LEN]
        .try_into()
        .map_err(|_| CoreError::MalformedContainer("bad length field".into()))?;
    let header_len = u32::from_be_bytes(len_bytes);
    if header_len > MAX_HEADER_LEN {
        return Err(CoreError::MalformedContainer(format!(
            "header length {header_len} exceeds maximum"
        )));
    }

    let total = PREFIX_LEN + header_len as usize;
    if buf.len() < total {
        return Ok(ParseStep::NeedMore);
    }

    let header_bytes = &buf[PREFIX_LEN..total];
    let value: Value = ciborium::from_reader(header_bytes)
        .map_err(|e| CoreError::Decoding(e.to_string()))?;
    let policy = value_to_policy(&value)?;

    Ok(ParseStep::Done(policy, total))
}

/// A parsed prologue plus any body bytes that arrived in the same chunks.
#[derive(Debug)]
pub struct Prologue {
    /// The hidden policy recovered from the header.
    pub policy: HiddenPolicy,
    /// Bytes read past the header; they belong to the sealed body and
    /// must be fed to the unseal primitive ahead of the rest of the
    /// stream.
    pub overrun: Bytes,
}

/// Read the container prologue from a chunk stream without consuming the
/// body.
///
/// Buffers only as much as the header needs. The remaining receiver
/// continues to yield body chunks; `overrun` holds whatever body bytes
/// were already pulled in.
pub async fn read_prologue(rx: &mut ChunkReceiver) -> Result<Prologue, CoreError> {
    let mut buf = BytesMut::new();

    loop {
        match parse_prologue(&buf)? {
            ParseStep::Done(policy, consumed) => {
                let overrun = buf.split_off(consumed).freeze();
                return Ok(Prologue { policy, overrun });
            }
            ParseStep::NeedMore => match rx.recv().await {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => return Err(CoreError::TruncatedContainer),
            },
        }
    }
}
