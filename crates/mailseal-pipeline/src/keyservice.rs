//! The remote key-retrieval service, as a trait plus its wire contract.
//!
//! Key material is released against a bearer credential. A response is
//! usable only when it reports both a complete session and a valid
//! proof; anything else is a key-service failure, enforced here in
//! [`KeyResponse::into_key`] so every transport implementation gets the
//! same acceptance rule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mailseal_core::SigningIdentity;

use crate::error::{PipelineError, Result};

/// Session status a key response must report.
pub const STATUS_DONE: &str = "DONE";

/// Proof status a key response must report.
pub const PROOF_VALID: &str = "VALID";

/// The master public key all sealing is parameterized by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPublicKey(pub String);

/// The master verification key sender identities are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey(pub String);

/// A per-recipient decryption key for one (conjunction, timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKey(pub String);

/// Signing key material: the public signing key plus an optional key
/// over the private attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
    #[serde(rename = "pubSignKey")]
    pub public: String,
    #[serde(rename = "privSignKey", default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

/// Wire response for a decryption-key request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResponse {
    pub status: String,
    #[serde(rename = "proofStatus")]
    pub proof_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl KeyResponse {
    /// Accept the response only if it is complete and valid.
    pub fn into_key(self) -> Result<DecryptionKey> {
        check_status(&self.status, &self.proof_status)?;
        self.key.map(DecryptionKey).ok_or_else(|| {
            PipelineError::RemoteKeyService("response complete but carried no key".into())
        })
    }
}

/// Wire response for a signing-key request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyResponse {
    pub status: String,
    #[serde(rename = "proofStatus")]
    pub proof_status: String,
    #[serde(rename = "pubSignKey", default, skip_serializing_if = "Option::is_none")]
    pub pub_sign_key: Option<String>,
    #[serde(rename = "privSignKey", default, skip_serializing_if = "Option::is_none")]
    pub priv_sign_key: Option<String>,
}

impl SigningKeyResponse {
    /// Accept the response only if it is complete and valid.
    pub fn into_keys(self) -> Result<SigningKeys> {
        check_status(&self.status, &self.proof_status)?;
        let public = self.pub_sign_key.ok_or_else(|| {
            PipelineError::RemoteKeyService("response complete but carried no signing key".into())
        })?;
        Ok(SigningKeys {
            public,
            private: self.priv_sign_key,
        })
    }
}

fn check_status(status: &str, proof_status: &str) -> Result<()> {
    if status != STATUS_DONE || proof_status != PROOF_VALID {
        return Err(PipelineError::RemoteKeyService(format!(
            "session not complete and valid: status={status}, proofStatus={proof_status}"
        )));
    }
    Ok(())
}

/// The remote key service. Transport errors map to
/// [`PipelineError::RemoteKeyService`]; protocol-level rejection is
/// expressed through the response types above.
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Request a decryption key for the policy timestamp, presenting a
    /// bearer credential.
    async fn decryption_key(&self, bearer: &str, timestamp: i64) -> Result<KeyResponse>;

    /// Request signing keys for a signing identity.
    async fn signing_keys(
        &self,
        bearer: &str,
        identity: &SigningIdentity,
    ) -> Result<SigningKeyResponse>;

    /// Fetch the master public key from the parameters endpoint.
    async fn parameters(&self) -> Result<MasterPublicKey>;

    /// Fetch the master verification key from the signing parameters
    /// endpoint.
    async fn signing_parameters(&self) -> Result<VerificationKey>;
}
