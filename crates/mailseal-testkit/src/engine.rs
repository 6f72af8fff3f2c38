//! A working mock of the seal/unseal primitive.
//!
//! Real enough that round-trip, wrong-key, and sender-verification tests
//! mean something: the container uses the production prologue format,
//! the body is ChaCha20-Poly1305 under a random content key, and the
//! content key is wrapped per recipient under a key derived from that
//! recipient's mock decryption key. Only the derivations are mock — they
//! hang off a seed string carried inside the mock master key, so the
//! mock key service can hand out matching keys.

use async_trait::async_trait;
use bytes::Bytes;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use mailseal_core::{
    chunk, container, ChunkReceiver, ChunkSender, Conjunction, HiddenPolicy, PolicyHash,
    RecipientId,
};
use mailseal_pipeline::{
    DecryptionKey, EngineError, MasterPublicKey, SealEngine, SealOptions, SenderIdentity,
    Unsealer, VerificationKey,
};

/// Prefix of mock master public keys.
pub const MASTER_PREFIX: &str = "mock-master:";

/// Prefix of mock verification keys.
pub const VERIFICATION_PREFIX: &str = "mock-vk:";

/// Derive the mock decryption key for one (conjunction hash, timestamp).
///
/// The mock key service uses the same derivation, which is exactly what
/// makes a key "right" for a recipient.
pub fn mock_decryption_key(seed: &str, hash: &PolicyHash, timestamp: i64) -> String {
    hex::encode(
        blake3::hash(format!("usk:{seed}:{}:{timestamp}", hash.to_hex()).as_bytes()).as_bytes(),
    )
}

/// The mock sender-identity tag, checkable with the verification key.
fn sign_tag(seed: &str, sender: &SenderIdentity) -> Vec<u8> {
    let encoded = serde_json::to_vec(sender).expect("sender identity serialize");
    let mut input = format!("sign:{seed}:").into_bytes();
    input.extend_from_slice(&encoded);
    blake3::hash(&input).as_bytes().to_vec()
}

fn seed_from(key: &str, prefix: &str) -> Result<String, EngineError> {
    key.strip_prefix(prefix)
        .map(str::to_owned)
        .ok_or_else(|| EngineError::Seal(format!("unrecognized key material: {key}")))
}

/// Everything after the container prologue.
#[derive(Debug, Serialize, Deserialize)]
struct SealedBody {
    /// Per-recipient content-key wraps: recipient id -> wrapped key.
    wraps: Vec<(String, Vec<u8>)>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

/// What the AEAD ciphertext decrypts to.
#[derive(Debug, Serialize, Deserialize)]
struct SealedPayload {
    sender: SenderIdentity,
    tag: Vec<u8>,
    body: Vec<u8>,
}

fn wrap_key(content_key: &[u8; 32], decryption_key: &str) -> Vec<u8> {
    let mask = blake3::hash(decryption_key.as_bytes());
    content_key
        .iter()
        .zip(mask.as_bytes())
        .map(|(a, b)| a ^ b)
        .collect()
}

fn unwrap_key(wrap: &[u8], decryption_key: &str) -> Result<[u8; 32], EngineError> {
    if wrap.len() != 32 {
        return Err(EngineError::Unseal("bad key wrap length".into()));
    }
    let mask = blake3::hash(decryption_key.as_bytes());
    let mut key = [0u8; 32];
    for (i, (a, b)) in wrap.iter().zip(mask.as_bytes()).enumerate() {
        key[i] = a ^ b;
    }
    Ok(key)
}

/// Parse the sender identity back out of mock signing keys.
///
/// The mock key service encodes the signed conjunctions directly into
/// the key strings; see [`crate::keyservice::MockKeyService`].
fn identity_from_signing_keys(
    public: &str,
    private: Option<&str>,
) -> Result<SenderIdentity, EngineError> {
    let public: Conjunction = serde_json::from_str(public)
        .map_err(|e| EngineError::Seal(format!("bad public signing key: {e}")))?;
    let private = private
        .map(|p| {
            serde_json::from_str::<Conjunction>(p)
                .map_err(|e| EngineError::Seal(format!("bad private signing key: {e}")))
        })
        .transpose()?;
    Ok(SenderIdentity { public, private })
}

/// The mock engine. Stateless; safe to share.
#[derive(Debug, Default, Clone)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Seal a payload directly, without running the seal pipeline.
///
/// For tests that need a ciphertext but exercise only the unseal side.
/// The sender's identity is a single email attribute.
pub async fn seal_container(
    engine: &MockEngine,
    master_key: &MasterPublicKey,
    policy: &mailseal_core::Policy,
    sender: &str,
    payload: &[u8],
) -> Bytes {
    let public = Conjunction(vec![mailseal_core::AttributeRequest::email(sender)]);
    let signing = mailseal_pipeline::SigningKeys {
        public: serde_json::to_string(&public).expect("conjunction serialize"),
        private: None,
    };

    let (pt_tx, pt_rx) = mailseal_core::chunk_channel();
    let (ct_tx, mut ct_rx) = mailseal_core::chunk_channel();
    let data = Bytes::copy_from_slice(payload);
    tokio::spawn(async move {
        chunk::send_split(&pt_tx, data, chunk::DEFAULT_CHUNK_SIZE).await;
    });
    let collector = tokio::spawn(async move { chunk::collect(&mut ct_rx).await });

    engine
        .seal(
            master_key,
            SealOptions {
                policy: policy.clone(),
                signing,
            },
            pt_rx,
            ct_tx,
        )
        .await
        .expect("mock seal");
    collector.await.expect("collector")
}

#[async_trait]
impl SealEngine for MockEngine {
    async fn seal(
        &self,
        master_key: &MasterPublicKey,
        options: SealOptions,
        mut source: ChunkReceiver,
        sink: ChunkSender,
    ) -> Result<(), EngineError> {
        let seed = seed_from(&master_key.0, MASTER_PREFIX)?;
        let plaintext = chunk::collect(&mut source).await;

        let sender = identity_from_signing_keys(
            &options.signing.public,
            options.signing.private.as_deref(),
        )?;
        let tag = sign_tag(&seed, &sender);

        let mut content_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut content_key);
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let wraps = options
            .policy
            .iter()
            .map(|(recipient, entry)| {
                let hash = entry.conjunction.canonical_hash();
                let usk = mock_decryption_key(&seed, &hash, entry.timestamp);
                (recipient.as_str().to_owned(), wrap_key(&content_key, &usk))
            })
            .collect();

        let payload = SealedPayload {
            sender,
            tag,
            body: plaintext.to_vec(),
        };
        let mut payload_bytes = Vec::new();
        ciborium::into_writer(&payload, &mut payload_bytes)
            .map_err(|e| EngineError::Seal(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&content_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), payload_bytes.as_slice())
            .map_err(|e| EngineError::Seal(e.to_string()))?;

        let body = SealedBody {
            wraps,
            nonce: nonce.to_vec(),
            ciphertext,
        };
        let mut out = container::encode_prologue(&options.policy);
        ciborium::into_writer(&body, &mut out).map_err(|e| EngineError::Seal(e.to_string()))?;

        chunk::send_split(&sink, Bytes::from(out), chunk::DEFAULT_CHUNK_SIZE).await;
        Ok(())
    }

    async fn open(
        &self,
        verification_key: &VerificationKey,
        mut source: ChunkReceiver,
    ) -> Result<Box<dyn Unsealer>, EngineError> {
        let seed = seed_from(&verification_key.0, VERIFICATION_PREFIX)
            .map_err(|_| EngineError::Unseal("unrecognized verification key".into()))?;

        let prologue = mailseal_core::read_prologue(&mut source)
            .await
            .map_err(|e| EngineError::Unseal(e.to_string()))?;

        let mut body = prologue.overrun.to_vec();
        body.extend_from_slice(&chunk::collect(&mut source).await);

        Ok(Box::new(MockUnsealer {
            policy: prologue.policy,
            body,
            seed,
        }))
    }
}

/// An opened mock container.
pub struct MockUnsealer {
    policy: HiddenPolicy,
    body: Vec<u8>,
    seed: String,
}

#[async_trait]
impl Unsealer for MockUnsealer {
    fn hidden_policy(&self) -> &HiddenPolicy {
        &self.policy
    }

    async fn unseal(
        self: Box<Self>,
        recipient: &RecipientId,
        key: &DecryptionKey,
        sink: ChunkSender,
    ) -> Result<SenderIdentity, EngineError> {
        let sealed: SealedBody = ciborium::from_reader(self.body.as_slice())
            .map_err(|e| EngineError::Unseal(e.to_string()))?;

        let wrap = sealed
            .wraps
            .iter()
            .find(|(id, _)| id == recipient.as_str())
            .map(|(_, wrap)| wrap)
            .ok_or_else(|| EngineError::Unseal("recipient not in key table".into()))?;

        let content_key = unwrap_key(wrap, &key.0)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&content_key));
        if sealed.nonce.len() != 12 {
            return Err(EngineError::Unseal("bad nonce length".into()));
        }
        let payload_bytes = cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|_| EngineError::Unseal("authentication failed".into()))?;

        let payload: SealedPayload = ciborium::from_reader(payload_bytes.as_slice())
            .map_err(|e| EngineError::Unseal(e.to_string()))?;

        if sign_tag(&self.seed, &payload.sender) != payload.tag {
            return Err(EngineError::SenderVerification);
        }

        chunk::send_split(&sink, Bytes::from(payload.body), chunk::DEFAULT_CHUNK_SIZE).await;
        Ok(payload.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailseal_core::{chunk_channel, AttributeRequest, Policy, PolicyEntry};
    use mailseal_pipeline::SigningKeys;

    const SEED: &str = "engine-test-seed";

    fn master() -> MasterPublicKey {
        MasterPublicKey(format!("{MASTER_PREFIX}{SEED}"))
    }

    fn vk() -> VerificationKey {
        VerificationKey(format!("{VERIFICATION_PREFIX}{SEED}"))
    }

    fn policy_for(addr: &str, ts: i64) -> Policy {
        let mut policy = Policy::new();
        policy.insert(
            RecipientId::canonicalize(addr),
            PolicyEntry {
                timestamp: ts,
                conjunction: Conjunction(vec![AttributeRequest::email(addr)]),
            },
        );
        policy
    }

    fn signing_for(sender: &str) -> SigningKeys {
        let public = Conjunction(vec![AttributeRequest::email(sender)]);
        SigningKeys {
            public: serde_json::to_string(&public).unwrap(),
            private: None,
        }
    }

    async fn seal_bytes(plaintext: &[u8], policy: Policy, signing: SigningKeys) -> Bytes {
        let engine = MockEngine::new();
        let (pt_tx, pt_rx) = chunk_channel();
        let (ct_tx, mut ct_rx) = chunk_channel();

        let data = Bytes::copy_from_slice(plaintext);
        tokio::spawn(async move {
            chunk::send_split(&pt_tx, data, 16).await;
        });
        let collector = tokio::spawn(async move { chunk::collect(&mut ct_rx).await });

        engine
            .seal(&master(), SealOptions { policy, signing }, pt_rx, ct_tx)
            .await
            .unwrap();
        collector.await.unwrap()
    }

    #[tokio::test]
    async fn test_seal_unseal_roundtrip() {
        let ts = 1736870400;
        let ciphertext = seal_bytes(
            b"the exact envelope bytes",
            policy_for("a@example.com", ts),
            signing_for("s@example.com"),
        )
        .await;

        let engine = MockEngine::new();
        let (ct_tx, ct_rx) = chunk_channel();
        tokio::spawn(async move {
            chunk::send_split(&ct_tx, ciphertext, 16).await;
        });

        let unsealer = engine.open(&vk(), ct_rx).await.unwrap();
        let recipient = RecipientId::canonicalize("a@example.com");
        let entry = unsealer.hidden_policy().get(&recipient).cloned().unwrap();

        let usk = mock_decryption_key(SEED, &entry.conjunction.canonical_hash(), ts);
        let (pt_tx, mut pt_rx) = chunk_channel();
        let collector = tokio::spawn(async move { chunk::collect(&mut pt_rx).await });
        let sender = unsealer
            .unseal(&recipient, &DecryptionKey(usk), pt_tx)
            .await
            .unwrap();

        assert_eq!(&collector.await.unwrap()[..], b"the exact envelope bytes");
        assert!(sender.public.0[0].is_email());
    }

    #[tokio::test]
    async fn test_wrong_key_fails_authentication() {
        let ts = 1736870400;
        let ciphertext = seal_bytes(
            b"secret",
            policy_for("a@example.com", ts),
            signing_for("s@example.com"),
        )
        .await;

        let engine = MockEngine::new();
        let (ct_tx, ct_rx) = chunk_channel();
        tokio::spawn(async move {
            chunk::send_split(&ct_tx, ciphertext, 64).await;
        });
        let unsealer = engine.open(&vk(), ct_rx).await.unwrap();

        let recipient = RecipientId::canonicalize("a@example.com");
        let (pt_tx, _pt_rx) = chunk_channel();
        let err = unsealer
            .unseal(&recipient, &DecryptionKey("not-the-key".into()), pt_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unseal(_)));
    }

    #[tokio::test]
    async fn test_tampered_sender_fails_verification() {
        // Seal under one seed, open with a verification key from
        // another: the identity tag cannot check out.
        let ts = 1736870400;
        let ciphertext = seal_bytes(
            b"secret",
            policy_for("a@example.com", ts),
            signing_for("s@example.com"),
        )
        .await;

        let engine = MockEngine::new();
        let (ct_tx, ct_rx) = chunk_channel();
        tokio::spawn(async move {
            chunk::send_split(&ct_tx, ciphertext, 64).await;
        });
        let other_vk = VerificationKey(format!("{VERIFICATION_PREFIX}other-seed"));
        let unsealer = engine.open(&other_vk, ct_rx).await.unwrap();

        let recipient = RecipientId::canonicalize("a@example.com");
        let entry = unsealer.hidden_policy().get(&recipient).cloned().unwrap();
        // The right content key, so decryption succeeds and only the
        // sender check can fail.
        let usk = mock_decryption_key(SEED, &entry.conjunction.canonical_hash(), ts);

        let (pt_tx, _pt_rx) = chunk_channel();
        let err = unsealer
            .unseal(&recipient, &DecryptionKey(usk), pt_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SenderVerification));
    }
}
