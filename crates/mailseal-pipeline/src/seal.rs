//! The seal pipeline: outgoing encryption orchestration.
//!
//! One run per send. Steps are strictly sequential: envelope
//! construction, signing-credential resolution, signing-key exchange,
//! one invocation of the seal primitive, attachment substitution. The
//! plaintext sent-copy archival runs concurrently and is best-effort;
//! its failure never aborts the send. Sealing itself is atomic — on any
//! failure the partial ciphertext is discarded and the original compose
//! details are left untouched.

use std::sync::Arc;

use mailseal_core::{
    chunk, chunk_channel, Attachment, CoreError, EnvelopeBuilder, PolicyBuilder,
    SigningIdentity,
};
use mailseal_session::{DisclosureKind, SessionInit};

use crate::engine::{EngineError, SealEngine, SealOptions};
use crate::error::{PipelineError, Result};
use crate::keyservice::{KeyService, MasterPublicKey};
use crate::mailstore::{ComposeDetails, MailStore, MessageId};
use crate::resolver::CredentialResolver;
use crate::tabs::{TabId, TabStateRegistry};

/// Seal pipeline configuration.
#[derive(Debug, Clone)]
pub struct SealConfig {
    /// Local folder plaintext copies of sealed sends are archived into.
    pub sent_copy_folder: String,
    /// Subject shown on the ciphertext message.
    pub placeholder_subject: String,
    /// Body shown on the ciphertext message.
    pub placeholder_body: String,
    /// Name of the single ciphertext attachment.
    pub attachment_name: String,
    /// Content type of the ciphertext attachment.
    pub attachment_content_type: String,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            sent_copy_folder: "MailSeal Sent".into(),
            placeholder_subject: "MailSeal Encrypted Message".into(),
            placeholder_body:
                "This message is encrypted. Use MailSeal to read it.".into(),
            attachment_name: "mailseal.encrypted".into(),
            attachment_content_type: "application/mailseal".into(),
        }
    }
}

/// One seal invocation's inputs.
#[derive(Debug, Clone)]
pub struct SealRequest {
    pub tab: TabId,
    pub details: ComposeDetails,
    /// Seal timestamp, epoch seconds.
    pub timestamp: i64,
    /// Pinned multipart boundary; tests only.
    pub boundary: Option<String>,
}

/// The sealed replacement for the compose details.
#[derive(Debug, Clone)]
pub struct SealedMessage {
    pub details: ComposeDetails,
}

/// Orchestrates outgoing encryption.
pub struct SealPipeline {
    resolver: CredentialResolver,
    key_service: Arc<dyn KeyService>,
    engine: Arc<dyn SealEngine>,
    mail: Arc<dyn MailStore>,
    tabs: Arc<TabStateRegistry>,
    config: SealConfig,
}

impl SealPipeline {
    pub fn new(
        resolver: CredentialResolver,
        key_service: Arc<dyn KeyService>,
        engine: Arc<dyn SealEngine>,
        mail: Arc<dyn MailStore>,
        tabs: Arc<TabStateRegistry>,
        config: SealConfig,
    ) -> Self {
        Self {
            resolver,
            key_service,
            engine,
            mail,
            tabs,
            config,
        }
    }

    /// Seal one outgoing message.
    pub async fn seal(
        &self,
        master_key: &MasterPublicKey,
        request: SealRequest,
    ) -> Result<SealedMessage> {
        let state = self.tabs.get(request.tab).unwrap_or_default();
        let details = &request.details;

        // Per-recipient policy from to+cc, with any tab overrides.
        let mut builder = PolicyBuilder::new(request.timestamp);
        if let Some(overrides) = &state.policy_override {
            for (recipient, conjunction) in overrides {
                builder = builder.override_for(recipient.as_str(), conjunction.clone());
            }
        }
        let recipients = details.to.iter().chain(details.cc.iter());
        let policy = builder.build(recipients).map_err(|e| match e {
            CoreError::EmptyConjunction(r) => PipelineError::Configuration(format!(
                "attribute override leaves recipient {r} with an empty conjunction"
            )),
            other => other.into(),
        })?;

        // The deterministic envelope: these exact bytes are sealed,
        // signed, and archived.
        let mut envelope_builder =
            EnvelopeBuilder::new(&details.from, request.timestamp)
                .to(details.to.iter().cloned())
                .cc(details.cc.iter().cloned())
                .subject(&details.subject);
        envelope_builder = if details.is_plain_text {
            envelope_builder.plain_body(&details.body)
        } else {
            envelope_builder.html_body(&details.body)
        };
        for attachment in &details.attachments {
            envelope_builder = envelope_builder.attachment(attachment.clone());
        }
        if let Some(boundary) = &request.boundary {
            envelope_builder = envelope_builder.boundary(boundary.clone());
        }
        let envelope = envelope_builder.build()?;

        // Signing credential: cache, or an interactive Signing session.
        let identity = SigningIdentity::derive(&details.from, state.sign_override.as_ref());
        let combined = identity.combined();
        let init = SessionInit::new(combined.clone(), DisclosureKind::Signing);
        let resolved = self.resolver.resolve(&combined, init, request.timestamp).await?;
        if resolved.fresh {
            self.resolver.commit(&combined, &resolved.credential).await?;
        }

        let signing = self
            .key_service
            .signing_keys(&resolved.credential.bearer, &identity)
            .await?
            .into_keys()?;

        // One atomic invocation of the seal primitive over the envelope
        // stream.
        let (env_tx, env_rx) = chunk_channel();
        let (ct_tx, ct_rx) = chunk_channel();

        let plaintext = envelope.clone();
        tokio::spawn(async move {
            chunk::send_split(&env_tx, plaintext, chunk::DEFAULT_CHUNK_SIZE).await;
        });
        let collector = tokio::spawn(async move {
            let mut rx = ct_rx;
            chunk::collect(&mut rx).await
        });

        self.engine
            .seal(master_key, SealOptions { policy, signing }, env_rx, ct_tx)
            .await?;

        let ciphertext = collector
            .await
            .map_err(|e| PipelineError::CryptoPrimitive(EngineError::Seal(e.to_string())))?;

        tracing::debug!(
            tab = request.tab,
            ciphertext_len = ciphertext.len(),
            "sealed outgoing message"
        );

        // Best-effort plaintext archival, concurrent with the send.
        self.spawn_archival(request.tab, envelope);

        // The message that actually leaves: placeholder subject/body,
        // original attachments stripped, ciphertext as the single
        // attachment.
        let mut sealed = request.details;
        sealed.subject = self.config.placeholder_subject.clone();
        sealed.body = self.config.placeholder_body.clone();
        sealed.is_plain_text = true;
        sealed.attachments = vec![Attachment {
            name: self.config.attachment_name.clone(),
            content_type: self.config.attachment_content_type.clone(),
            data: ciphertext,
        }];

        Ok(SealedMessage { details: sealed })
    }

    /// Archive the plaintext envelope into the local sent folder,
    /// recording the new message id on the tab. Failures are logged and
    /// swallowed; the send is already on its way.
    fn spawn_archival(&self, tab: TabId, plaintext: bytes::Bytes) {
        let mail = Arc::clone(&self.mail);
        let tabs = Arc::clone(&self.tabs);
        let folder_name = self.config.sent_copy_folder.clone();

        tokio::spawn(async move {
            let imported = async {
                let folder = mail.local_folder(&folder_name).await?;
                mail.import(&folder, plaintext).await
            }
            .await;

            match imported {
                Ok(id) => tabs.set_archived_copy(tab, id),
                Err(e) => {
                    tracing::warn!(tab, "failed to archive plaintext sent copy: {e}");
                }
            }
        });
    }

    /// Post-send cleanup: move the archived plaintext copy into the real
    /// sent folder, delete the ciphertext sent message, and purge the
    /// tab's state.
    pub async fn finalize_sent(&self, tab: TabId, sent: &[MessageId]) -> Result<()> {
        let archived = match self.tabs.get(tab).and_then(|s| s.archived_copy) {
            Some(id) => id,
            None => return Ok(()),
        };

        for &message in sent {
            if !self.mail.is_sealed(message).await? {
                continue;
            }
            let header = self.mail.message(message).await?;
            self.mail.move_message(archived, &header.folder).await?;
            self.mail.delete_message(message).await?;
            self.tabs.remove(tab);
        }
        Ok(())
    }
}
