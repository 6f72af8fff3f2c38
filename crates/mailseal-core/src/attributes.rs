//! Attribute requests, conjunctions, and their canonical hash.
//!
//! A [`Conjunction`] is one recipient's access condition: every attribute
//! in it must be disclosed for the key service to issue a decryption key.
//! Conjunctions are canonicalized (sorted) before hashing so that the
//! cache key is independent of the order attributes were listed in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::canonical_conjunction_bytes;

/// Attribute type identifying an email address.
///
/// Values of this type are always forced to the canonical (lower-cased,
/// display-name-stripped) address before hashing or sealing.
pub const ATTRIBUTE_EMAIL: &str = "attr.email";

/// A single disclosure condition.
///
/// Serialized with short field names (`t`, `v`) to match the container
/// header and key-service wire formats. A missing value means the holder
/// chooses the concrete value during the disclosure session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeRequest {
    /// Attribute type identifier, e.g. `attr.email`.
    #[serde(rename = "t")]
    pub atype: String,

    /// Requested value, if pinned.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl AttributeRequest {
    /// An attribute request pinning a concrete value.
    pub fn new(atype: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            atype: atype.into(),
            value: Some(value.into()),
        }
    }

    /// A value-less attribute request.
    pub fn any(atype: impl Into<String>) -> Self {
        Self {
            atype: atype.into(),
            value: None,
        }
    }

    /// An email attribute for the given address.
    pub fn email(address: impl Into<String>) -> Self {
        Self::new(ATTRIBUTE_EMAIL, address)
    }

    /// Whether this request is email-typed.
    pub fn is_email(&self) -> bool {
        self.atype == ATTRIBUTE_EMAIL
    }
}

/// An ordered set of attribute requests defining one recipient's access
/// condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conjunction(pub Vec<AttributeRequest>);

impl Conjunction {
    /// An empty conjunction.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, attr: AttributeRequest) {
        self.0.push(attr);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeRequest> {
        self.0.iter()
    }

    /// The canonical form: attributes sorted by `(atype, value)`.
    ///
    /// `None` values order before pinned values. Duplicates are retained;
    /// two conjunctions differing only in multiplicity hash differently.
    pub fn canonical(&self) -> Self {
        let mut sorted = self.0.clone();
        sorted.sort();
        Self(sorted)
    }

    /// Order-independent hash of this conjunction.
    ///
    /// Blake3 over the canonical CBOR encoding of the canonical form.
    /// This is the credential cache key: a credential may be reused only
    /// for a conjunction with the exact same hash.
    pub fn canonical_hash(&self) -> PolicyHash {
        let bytes = canonical_conjunction_bytes(&self.canonical());
        PolicyHash(*blake3::hash(&bytes).as_bytes())
    }
}

impl From<Vec<AttributeRequest>> for Conjunction {
    fn from(attrs: Vec<AttributeRequest>) -> Self {
        Self(attrs)
    }
}

impl FromIterator<AttributeRequest> for Conjunction {
    fn from_iter<I: IntoIterator<Item = AttributeRequest>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Conjunction {
    type Item = AttributeRequest;
    type IntoIter = std::vec::IntoIter<AttributeRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A 32-byte canonical policy hash, computed as
/// Blake3(canonical_conjunction_bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyHash(pub [u8; 32]);

impl PolicyHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string (the durable cache key).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for PolicyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PolicyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for PolicyHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
