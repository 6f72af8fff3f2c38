//! A mock key service whose keys actually open mock-sealed containers.
//!
//! Decryption keys are derived from the conjunction a bearer token
//! claims was disclosed, using the same derivation the mock engine wraps
//! content keys under. Signing keys encode the signing conjunctions
//! directly, so the engine can embed the sender identity the way the
//! real primitive would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mailseal_core::SigningIdentity;
use mailseal_pipeline::{
    KeyResponse, KeyService, MasterPublicKey, PipelineError, Result, SigningKeyResponse,
    VerificationKey,
};

use crate::engine::{mock_decryption_key, MASTER_PREFIX, VERIFICATION_PREFIX};
use crate::token::decode_bearer;

/// A scripted response override for the next key request.
#[derive(Debug, Clone)]
pub struct ScriptedStatus {
    pub status: String,
    pub proof_status: String,
}

/// The mock key service.
pub struct MockKeyService {
    seed: String,
    parameters_available: AtomicBool,
    signing_parameters_available: AtomicBool,
    overrides: Mutex<VecDeque<ScriptedStatus>>,
    decryption_requests: AtomicUsize,
    signing_requests: AtomicUsize,
}

impl MockKeyService {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            parameters_available: AtomicBool::new(true),
            signing_parameters_available: AtomicBool::new(true),
            overrides: Mutex::new(VecDeque::new()),
            decryption_requests: AtomicUsize::new(0),
            signing_requests: AtomicUsize::new(0),
        }
    }

    /// Simulate the parameters endpoint being unreachable.
    pub fn set_parameters_available(&self, available: bool) {
        self.parameters_available.store(available, Ordering::SeqCst);
    }

    /// Simulate the signing parameters endpoint being unreachable.
    pub fn set_signing_parameters_available(&self, available: bool) {
        self.signing_parameters_available
            .store(available, Ordering::SeqCst);
    }

    /// Make the next key request report the given statuses instead of
    /// succeeding.
    pub fn push_status(&self, status: impl Into<String>, proof_status: impl Into<String>) {
        self.overrides.lock().expect("lock").push_back(ScriptedStatus {
            status: status.into(),
            proof_status: proof_status.into(),
        });
    }

    pub fn decryption_requests(&self) -> usize {
        self.decryption_requests.load(Ordering::SeqCst)
    }

    pub fn signing_requests(&self) -> usize {
        self.signing_requests.load(Ordering::SeqCst)
    }

    fn next_override(&self) -> Option<ScriptedStatus> {
        self.overrides.lock().expect("lock").pop_front()
    }
}

#[async_trait]
impl KeyService for MockKeyService {
    async fn decryption_key(&self, bearer: &str, timestamp: i64) -> Result<KeyResponse> {
        self.decryption_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(scripted) = self.next_override() {
            return Ok(KeyResponse {
                status: scripted.status,
                proof_status: scripted.proof_status,
                key: None,
            });
        }

        // An undecodable bearer is a rejected session, not a transport
        // failure.
        let Some((con, _exp)) = decode_bearer(bearer) else {
            return Ok(KeyResponse {
                status: "ERROR".into(),
                proof_status: "INVALID".into(),
                key: None,
            });
        };

        let key = mock_decryption_key(&self.seed, &con.canonical_hash(), timestamp);
        Ok(KeyResponse {
            status: "DONE".into(),
            proof_status: "VALID".into(),
            key: Some(key),
        })
    }

    async fn signing_keys(
        &self,
        bearer: &str,
        identity: &SigningIdentity,
    ) -> Result<SigningKeyResponse> {
        self.signing_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(scripted) = self.next_override() {
            return Ok(SigningKeyResponse {
                status: scripted.status,
                proof_status: scripted.proof_status,
                pub_sign_key: None,
                priv_sign_key: None,
            });
        }

        if decode_bearer(bearer).is_none() {
            return Ok(SigningKeyResponse {
                status: "ERROR".into(),
                proof_status: "INVALID".into(),
                pub_sign_key: None,
                priv_sign_key: None,
            });
        }

        let pub_sign_key =
            serde_json::to_string(&identity.public).expect("conjunction serialize");
        let priv_sign_key = identity
            .private
            .as_ref()
            .map(|p| serde_json::to_string(p).expect("conjunction serialize"));

        Ok(SigningKeyResponse {
            status: "DONE".into(),
            proof_status: "VALID".into(),
            pub_sign_key: Some(pub_sign_key),
            priv_sign_key,
        })
    }

    async fn parameters(&self) -> Result<MasterPublicKey> {
        if !self.parameters_available.load(Ordering::SeqCst) {
            return Err(PipelineError::RemoteKeyService(
                "parameters endpoint unreachable".into(),
            ));
        }
        Ok(MasterPublicKey(format!("{MASTER_PREFIX}{}", self.seed)))
    }

    async fn signing_parameters(&self) -> Result<VerificationKey> {
        if !self.signing_parameters_available.load(Ordering::SeqCst) {
            return Err(PipelineError::RemoteKeyService(
                "signing parameters endpoint unreachable".into(),
            ));
        }
        Ok(VerificationKey(format!("{VERIFICATION_PREFIX}{}", self.seed)))
    }
}
