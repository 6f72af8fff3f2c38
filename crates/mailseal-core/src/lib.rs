//! # MailSeal Core
//!
//! Pure primitives for MailSeal: attribute policies, canonical hashing,
//! and the envelope/container byte formats.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data model, plus the chunk-channel plumbing the
//! pipelines stream bytes through.
//!
//! ## Key Types
//!
//! - [`AttributeRequest`] / [`Conjunction`] - one recipient's access condition
//! - [`PolicyHash`] - order-independent Blake3 hash, the credential cache key
//! - [`Policy`] / [`HiddenPolicy`] - per-recipient encryption parameters
//! - [`PolicyBuilder`] / [`SigningIdentity`] - policy derivation from compose details
//! - [`EnvelopeBuilder`] - the deterministic signed plaintext
//! - [`container`] - the self-describing ciphertext prologue
//!
//! ## Canonicalization
//!
//! Conjunctions are sorted and encoded with deterministic CBOR before
//! hashing. See the [`canonical`] module.

pub mod attributes;
pub mod canonical;
pub mod chunk;
pub mod container;
pub mod envelope;
pub mod error;
pub mod policy;

pub use attributes::{AttributeRequest, Conjunction, PolicyHash, ATTRIBUTE_EMAIL};
pub use canonical::{canonical_conjunction_bytes, canonical_policy_bytes};
pub use chunk::{chunk_channel, ChunkReceiver, ChunkSender};
pub use container::{encode_prologue, read_prologue, Prologue};
pub use envelope::{Attachment, EnvelopeBuilder, MARKER_HEADER};
pub use error::CoreError;
pub use policy::{
    hint_conjunction, key_request_conjunction, normalize_email_attributes, HiddenPolicy, Policy,
    PolicyBuilder, PolicyEntry, RecipientId, SigningIdentity,
};
