//! The MailSeal facade: collaborators wired into a running instance.
//!
//! Owns the tab registry, both pipelines, and the lifecycle pieces:
//! master-key retrieval at startup (with durable fallback) and periodic
//! cache eviction. The host mail client calls in through the event
//! entry points; everything else is internal.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use mailseal_cache::CacheStore;
use mailseal_pipeline::{
    ComposeDetails, DeliveredMessage, KeyService, MailStore, MasterPublicKey, MessageId, Notice,
    Notifier, PipelineError, SealEngine, SealPipeline, SealRequest, SendGate, TabId,
    TabStateRegistry, UnsealPipeline, VerificationKey, CredentialResolver, DecryptSlot,
};
use mailseal_session::{SessionCoordinator, SurfaceProvider};

use crate::config::MailSealConfig;
use crate::error::{MailSealError, Result};

/// The external collaborators a MailSeal instance is wired to.
pub struct Collaborators {
    pub cache: Arc<dyn CacheStore>,
    pub surface: Arc<dyn SurfaceProvider>,
    pub key_service: Arc<dyn KeyService>,
    pub engine: Arc<dyn SealEngine>,
    pub mail: Arc<dyn MailStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// What the host should do with an outgoing message.
#[derive(Debug, Clone)]
pub enum SendDecision {
    /// Sealing is off; send the original details unchanged.
    Passthrough(ComposeDetails),
    /// Abort the send (popup open, or bcc warning raised).
    Cancel,
    /// Send these sealed details instead.
    Send(ComposeDetails),
}

/// A running MailSeal instance.
pub struct MailSeal {
    config: MailSealConfig,
    cache: Arc<dyn CacheStore>,
    mail: Arc<dyn MailStore>,
    notifier: Arc<dyn Notifier>,
    tabs: Arc<TabStateRegistry>,
    seal: SealPipeline,
    unseal: UnsealPipeline,
    master_key: MasterPublicKey,
    verification_key: VerificationKey,
}

impl std::fmt::Debug for MailSeal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSeal")
            .field("config", &self.config)
            .field("master_key", &self.master_key)
            .field("verification_key", &self.verification_key)
            .finish_non_exhaustive()
    }
}

impl MailSeal {
    /// Wire up and start an instance.
    ///
    /// Fetches the master public key from the parameters endpoint,
    /// falling back to the last durably cached value on network failure;
    /// fails hard when neither is available. The verification key has no
    /// cached fallback.
    pub async fn start(collaborators: Collaborators, config: MailSealConfig) -> Result<Self> {
        let Collaborators {
            cache,
            surface,
            key_service,
            engine,
            mail,
            notifier,
        } = collaborators;

        let master_key = match key_service.parameters().await {
            Ok(key) => {
                // Keep the durable fallback current.
                if let Err(e) = cache.set_master_key(&key.0).await {
                    tracing::warn!("failed to persist master public key: {e}");
                }
                key
            }
            Err(e) => {
                tracing::warn!("parameters endpoint failed, trying cached master key: {e}");
                cache
                    .master_key()
                    .await?
                    .map(MasterPublicKey)
                    .ok_or_else(|| {
                        MailSealError::Configuration(
                            "no master public key available from the key service or cache".into(),
                        )
                    })?
            }
        };

        let verification_key = key_service.signing_parameters().await?;

        let tabs = Arc::new(TabStateRegistry::new());
        let resolver =
            CredentialResolver::new(Arc::clone(&cache), SessionCoordinator::new(surface));

        let seal = SealPipeline::new(
            resolver.clone(),
            Arc::clone(&key_service),
            Arc::clone(&engine),
            Arc::clone(&mail),
            Arc::clone(&tabs),
            config.seal.clone(),
        );
        let unseal = UnsealPipeline::new(
            resolver,
            key_service,
            engine,
            Arc::clone(&mail),
            DecryptSlot::new(),
            config.unseal.clone(),
        );

        Ok(Self {
            config,
            cache,
            mail,
            notifier,
            tabs,
            seal,
            unseal,
            master_key,
            verification_key,
        })
    }

    /// The tab registry, for hosts that drive popup state directly.
    pub fn tabs(&self) -> &Arc<TabStateRegistry> {
        &self.tabs
    }

    /// The master public key in use.
    pub fn master_key(&self) -> &MasterPublicKey {
        &self.master_key
    }

    /// Spawn the periodic cache eviction task.
    ///
    /// Runs until the returned handle is aborted or the runtime shuts
    /// down. Eviction is idempotent, so the cadence is not critical.
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let period = self.config.eviction_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The immediate first tick is fine: eviction on startup is
            // harmless.
            loop {
                ticker.tick().await;
                match cache.evict_expired(now_epoch_seconds()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(evicted = n, "evicted expired credentials"),
                    Err(e) => tracing::warn!("credential eviction failed: {e}"),
                }
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────
    // Compose lifecycle
    // ─────────────────────────────────────────────────────────────────

    /// A compose tab opened. Replies to a message that was once sealed
    /// default to sealing on.
    pub async fn on_compose_opened(&self, tab: TabId, reply_to: Option<MessageId>) {
        let mut encrypt = self.config.default_encrypt;
        if let Some(related) = reply_to {
            match self.mail.was_sealed(related).await {
                Ok(was) => encrypt = encrypt || was,
                Err(e) => tracing::debug!("reply heuristic lookup failed: {e}"),
            }
        }
        self.tabs.insert(tab, encrypt);
    }

    /// A compose tab closed; its state is purged unconditionally.
    pub fn on_compose_closed(&self, tab: TabId) {
        self.tabs.remove(tab);
    }

    /// Toggle sealing for a tab. Disabling clears any pending warning.
    pub async fn set_encryption(&self, tab: TabId, enabled: bool) {
        if let Some(cleared) = self.tabs.set_encrypt(tab, enabled) {
            self.notifier.clear(cleared).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // Outgoing
    // ─────────────────────────────────────────────────────────────────

    /// The host is about to send. Decide whether to pass through,
    /// cancel, or substitute sealed details.
    pub async fn on_before_send(&self, tab: TabId, details: ComposeDetails) -> Result<SendDecision> {
        self.on_before_send_at(tab, details, now_epoch_seconds()).await
    }

    /// [`Self::on_before_send`] with an injected timestamp.
    pub async fn on_before_send_at(
        &self,
        tab: TabId,
        details: ComposeDetails,
        now: i64,
    ) -> Result<SendDecision> {
        match self.tabs.send_gate(tab) {
            SendGate::Passthrough => return Ok(SendDecision::Passthrough(details)),
            SendGate::PopupOpen(popup) => {
                // An open config popup means the user is mid-decision:
                // bring it forward and hold the send.
                self.notifier.refocus_popup(popup).await;
                return Ok(SendDecision::Cancel);
            }
            SendGate::Seal => {}
        }

        // Hidden recipients cannot be expressed in an attribute policy.
        if !details.bcc.is_empty() {
            let pending = self.tabs.get(tab).and_then(|s| s.pending_notification);
            if pending.is_none() {
                let id = self.notifier.warn(Notice::BccWarning).await;
                self.tabs.set_pending_notification(tab, Some(id));
            }
            return Ok(SendDecision::Cancel);
        }

        let sealed = self
            .seal
            .seal(
                &self.master_key,
                SealRequest {
                    tab,
                    details,
                    timestamp: now,
                    boundary: None,
                },
            )
            .await?;

        Ok(SendDecision::Send(sealed.details))
    }

    /// The host reports the message sent: finalize the archived copy and
    /// remove the ciphertext from the sent folder.
    pub async fn on_after_send(&self, tab: TabId, sent: &[MessageId]) -> Result<()> {
        self.seal.finalize_sent(tab, sent).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Incoming
    // ─────────────────────────────────────────────────────────────────

    /// Decrypt the displayed message and deliver the plaintext in its
    /// place.
    pub async fn decrypt_message(&self, message: MessageId) -> Result<DeliveredMessage> {
        self.decrypt_message_at(message, now_epoch_seconds()).await
    }

    /// [`Self::decrypt_message`] with an injected timestamp.
    pub async fn decrypt_message_at(
        &self,
        message: MessageId,
        now: i64,
    ) -> Result<DeliveredMessage> {
        let result = self
            .unseal
            .unseal(
                message,
                &self.config.local_identity,
                &self.verification_key,
                now,
            )
            .await;

        if let Err(e) = &result {
            match e {
                PipelineError::RecipientUnknown(_) => {
                    self.notifier.error(Notice::RecipientUnknown).await;
                }
                PipelineError::CryptoPrimitive(_)
                | PipelineError::RemoteKeyService(_)
                | PipelineError::Persistence(_)
                | PipelineError::Cache(_)
                | PipelineError::Core(_) => {
                    self.notifier.error(Notice::DecryptionFailed).await;
                }
                // Cancellation, single-flight rejection, and
                // precondition misses are silent: the user either caused
                // them or can just retry.
                PipelineError::SessionCancelled
                | PipelineError::Surface(_)
                | PipelineError::Concurrency
                | PipelineError::NotDisplayed(_)
                | PipelineError::Configuration(_) => {}
            }
        }

        Ok(result?)
    }
}

/// Current time, epoch seconds.
fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs() as i64
}
