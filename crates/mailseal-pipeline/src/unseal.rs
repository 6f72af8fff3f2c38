//! The unseal pipeline: incoming decryption orchestration.
//!
//! A state machine, one run per message:
//!
//! ```text
//! INIT -> METADATA -> KEY_WAIT -> DECRYPTING -> DELIVERED
//!   \________\___________\____________\______-> FAILED
//! ```
//!
//! Decryption is globally single-flight: a second run starting while one
//! is active fails immediately, it never queues. Any failure before
//! DELIVERED leaves the original ciphertext message untouched; the final
//! delete happens strictly after the plaintext copy has been persisted
//! and moved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};

use mailseal_core::{
    chunk, chunk_channel, hint_conjunction, key_request_conjunction, RecipientId,
};
use mailseal_session::{DisclosureKind, SessionInit};

use crate::engine::{EngineError, SealEngine, SenderIdentity};
use crate::error::{PipelineError, Result};
use crate::keyservice::{KeyService, VerificationKey};
use crate::mailstore::{badge_kind, Badge, FolderId, MailStore, MessageHeader, MessageId, MessageQuery};
use crate::resolver::CredentialResolver;

/// Unseal pipeline configuration.
#[derive(Debug, Clone)]
pub struct UnsealConfig {
    /// Local folder plaintext is imported into before the final move.
    pub received_copy_folder: String,
    /// Relocation attempts after the post-delivery move.
    pub relocate_attempts: u32,
    /// Delay between relocation attempts.
    pub relocate_interval: Duration,
}

impl Default for UnsealConfig {
    fn default() -> Self {
        Self {
            received_copy_folder: "MailSeal Received".into(),
            relocate_attempts: 10,
            relocate_interval: Duration::from_millis(100),
        }
    }
}

/// Pipeline states, for tracing and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsealState {
    Init,
    Metadata,
    KeyWait,
    Decrypting,
    Delivered,
    Failed,
}

/// The global single-flight slot for decryption.
///
/// Holds one permit. A pipeline run owns the permit for its entire
/// lifetime; dropping it on any exit path (success or failure) frees the
/// slot.
#[derive(Clone)]
pub struct DecryptSlot {
    permit: Arc<Semaphore>,
}

impl DecryptSlot {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    fn try_begin(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.permit)
            .try_acquire_owned()
            .map_err(|_: TryAcquireError| PipelineError::Concurrency)
    }

    /// Whether a decryption is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

impl Default for DecryptSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A successfully delivered message.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    /// The delivered message's id, when post-move relocation found it.
    /// `None` means the message is delivered but unselected.
    pub delivered: Option<MessageId>,
    /// The verified sender identity.
    pub sender: SenderIdentity,
}

/// Orchestrates incoming decryption.
pub struct UnsealPipeline {
    resolver: CredentialResolver,
    key_service: Arc<dyn KeyService>,
    engine: Arc<dyn SealEngine>,
    mail: Arc<dyn MailStore>,
    slot: DecryptSlot,
    config: UnsealConfig,
}

impl UnsealPipeline {
    pub fn new(
        resolver: CredentialResolver,
        key_service: Arc<dyn KeyService>,
        engine: Arc<dyn SealEngine>,
        mail: Arc<dyn MailStore>,
        slot: DecryptSlot,
        config: UnsealConfig,
    ) -> Self {
        Self {
            resolver,
            key_service,
            engine,
            mail,
            slot,
            config,
        }
    }

    /// Decrypt one message and deliver the plaintext in its place.
    pub async fn unseal(
        &self,
        message: MessageId,
        local_identity: &str,
        verification_key: &VerificationKey,
        now: i64,
    ) -> Result<DeliveredMessage> {
        // INIT: claim the global slot and check preconditions. The
        // permit lives until this function returns, on every path.
        let _permit = self.slot.try_begin()?;
        self.enter(message, UnsealState::Init);

        if self.mail.displayed_message().await? != Some(message) {
            return Err(PipelineError::NotDisplayed(message));
        }

        let original = self.mail.message(message).await?;
        let stream = self.mail.sealed_attachment(message).await?.ok_or_else(|| {
            PipelineError::Configuration(format!("message {message} has no sealed attachment"))
        })?;

        // METADATA: recover the hidden policy from the header alone and
        // match the local identity against the recipient table.
        self.enter(message, UnsealState::Metadata);
        let unsealer = self.engine.open(verification_key, stream).await?;

        let local = RecipientId::canonicalize(local_identity);
        let entry = unsealer
            .hidden_policy()
            .get(&local)
            .cloned()
            .ok_or_else(|| PipelineError::RecipientUnknown(local.to_string()))?;

        // KEY_WAIT: credential from cache or session, then the key
        // exchange, keyed by the policy's timestamp. The embedded email
        // hint is never trusted for the match; the verified local
        // identity replaces it.
        self.enter(message, UnsealState::KeyWait);
        let request_con = key_request_conjunction(&entry.conjunction, &local);
        let hints = hint_conjunction(&entry.conjunction, &local);

        let init = SessionInit::new(request_con, DisclosureKind::Decryption)
            .with_hints(hints.clone())
            .with_sender(RecipientId::canonicalize(&original.author));
        let resolved = self.resolver.resolve(&hints, init, now).await?;

        let key = self
            .key_service
            .decryption_key(&resolved.credential.bearer, entry.timestamp)
            .await?
            .into_key()?;

        // Cache only once the key service accepted the credential. A
        // cache write failure is not worth failing the decrypt over.
        if resolved.fresh {
            if let Err(e) = self.resolver.commit(&hints, &resolved.credential).await {
                tracing::warn!("failed to cache fresh credential: {e}");
            }
        }

        // DECRYPTING: one pass over the body; sender verification
        // happens inside the primitive and a mismatch fails the run.
        self.enter(message, UnsealState::Decrypting);
        let (pt_tx, pt_rx) = chunk_channel();
        let collector = tokio::spawn(async move {
            let mut rx = pt_rx;
            chunk::collect(&mut rx).await
        });

        let sender = unsealer.unseal(&local, &key, pt_tx).await?;
        let plaintext = collector
            .await
            .map_err(|e| PipelineError::CryptoPrimitive(EngineError::Unseal(e.to_string())))?;

        // DELIVERED: persist, move into the original folder, then (and
        // only then) delete the ciphertext.
        self.enter(message, UnsealState::Delivered);
        let local_folder = self.mail.local_folder(&self.config.received_copy_folder).await?;
        let imported = self.mail.import(&local_folder, plaintext).await?;
        let imported_header = self.mail.message(imported).await?;
        self.mail.move_message(imported, &original.folder).await?;

        let delivered = self.relocate(&original.folder, &imported_header).await;

        if let Some(found) = delivered {
            let badges: Vec<Badge> = sender
                .attributes()
                .map(|a| Badge {
                    kind: badge_kind(&a.atype).to_string(),
                    value: a.value.clone().unwrap_or_default(),
                })
                .collect();
            if let Err(e) = self.mail.set_badges(found, badges).await {
                tracing::warn!("failed to attach sender badges: {e}");
            }
            if let Err(e) = self.mail.select_message(found).await {
                tracing::warn!("failed to select delivered message: {e}");
            }
        }

        self.mail.delete_message(message).await?;

        Ok(DeliveredMessage { delivered, sender })
    }

    /// Find the just-moved message again. The move does not reliably
    /// report the new identity, so query by (subject, recipients,
    /// author, narrow time window), retrying on a fixed cadence. Gives
    /// up silently: the delivered message stays usable, just unselected.
    async fn relocate(&self, folder: &FolderId, header: &MessageHeader) -> Option<MessageId> {
        let query = MessageQuery {
            folder: folder.clone(),
            subject: header.subject.clone(),
            recipients: header.recipients.clone(),
            author: header.author.clone(),
            from_date: header.date - 1,
            to_date: header.date + 1,
        };

        for attempt in 0..self.config.relocate_attempts {
            match self.mail.query(&query).await {
                Ok(found) if found.len() == 1 => return Some(found[0]),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(attempt, "relocation query failed: {e}");
                }
            }
            tokio::time::sleep(self.config.relocate_interval).await;
        }

        tracing::debug!("relocation gave up; delivered message left unselected");
        None
    }

    fn enter(&self, message: MessageId, state: UnsealState) {
        tracing::debug!(message, ?state, "unseal state");
    }
}
