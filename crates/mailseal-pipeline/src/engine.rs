//! The external seal/unseal primitive, as a trait.
//!
//! The actual cryptographic transform lives outside this system. The
//! pipelines only rely on the contract: sealing is a one-pass stream
//! transform parameterized by the master public key, the recipient
//! policy, and signing keys; unsealing discovers the hidden policy from
//! the container header, then yields plaintext incrementally and, at
//! completion, a verified sender identity. A sender-verification
//! mismatch is a hard unseal failure inside the primitive, never
//! something the pipeline is asked to tolerate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mailseal_core::{ChunkReceiver, ChunkSender, Conjunction, HiddenPolicy, Policy, RecipientId};

use crate::keyservice::{DecryptionKey, MasterPublicKey, SigningKeys, VerificationKey};

/// Errors surfaced by the seal/unseal primitive.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("seal failed: {0}")]
    Seal(String),

    #[error("unseal failed: {0}")]
    Unseal(String),

    #[error("sender verification failed")]
    SenderVerification,
}

/// Parameters for one seal invocation.
#[derive(Debug, Clone)]
pub struct SealOptions {
    /// Per-recipient access policy embedded in the container header.
    pub policy: Policy,
    /// Signing key material obtained from the key service.
    pub signing: SigningKeys,
}

/// The verified identity of a message's sender, as asserted by the
/// primitive after successful unsealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// Public signing conjunction (always present).
    pub public: Conjunction,
    /// Private signing attributes, when the sender disclosed any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<Conjunction>,
}

impl SenderIdentity {
    /// All attributes, public first.
    pub fn attributes(&self) -> impl Iterator<Item = &mailseal_core::AttributeRequest> {
        self.public
            .iter()
            .chain(self.private.iter().flat_map(|c| c.iter()))
    }
}

/// The seal/unseal stream transform.
#[async_trait]
pub trait SealEngine: Send + Sync {
    /// Seal a plaintext stream into a ciphertext stream.
    ///
    /// Treated as atomic by callers: on error, everything written to
    /// `sink` is discarded. The sink is dropped when sealing completes,
    /// ending the ciphertext stream.
    async fn seal(
        &self,
        master_key: &MasterPublicKey,
        options: SealOptions,
        source: ChunkReceiver,
        sink: ChunkSender,
    ) -> Result<(), EngineError>;

    /// Consume the container prologue from `source` and return an
    /// unsealer holding the hidden policy and the remaining body stream.
    async fn open(
        &self,
        verification_key: &VerificationKey,
        source: ChunkReceiver,
    ) -> Result<Box<dyn Unsealer>, EngineError>;
}

/// An opened container, ready to decrypt its body once a key is known.
#[async_trait]
pub trait Unsealer: Send {
    /// The hidden policy recovered from the container header.
    fn hidden_policy(&self) -> &HiddenPolicy;

    /// Decrypt the body into `sink` and verify the sender.
    ///
    /// Consumes the unsealer: the body can be read exactly once.
    async fn unseal(
        self: Box<Self>,
        recipient: &RecipientId,
        key: &DecryptionKey,
        sink: ChunkSender,
    ) -> Result<SenderIdentity, EngineError>;
}
