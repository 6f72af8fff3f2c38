//! # MailSeal
//!
//! Attribute-based mail encryption orchestration. Recipients are
//! authorized by attribute policies ("owns email X") instead of
//! pre-shared keys; this crate wires the policy, cache, session, and
//! pipeline layers into one facade a mail client host drives through
//! its compose and display events.
//!
//! ## Overview
//!
//! - **Outgoing**: compose details are serialized into a deterministic
//!   envelope, sealed by the external crypto primitive under a
//!   per-recipient policy, and substituted with a placeholder message
//!   carrying the ciphertext as its single attachment. A plaintext copy
//!   is archived best-effort for recovery.
//! - **Incoming**: the hidden policy is discovered from the ciphertext
//!   header, a credential is resolved (cache first, interactive
//!   disclosure session on miss), the body is unsealed and delivered in
//!   place of the ciphertext — which is deleted only after the
//!   plaintext is durably persisted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailseal::{Collaborators, MailSeal, MailSealConfig};
//!
//! async fn example(collaborators: Collaborators) {
//!     let config = MailSealConfig::new("me@example.com");
//!     let app = MailSeal::start(collaborators, config).await.unwrap();
//!     let _cleanup = app.spawn_cleanup();
//!
//!     // Host event wiring:
//!     // app.on_compose_opened(tab, None).await;
//!     // let decision = app.on_before_send(tab, details).await?;
//!     // app.decrypt_message(message_id).await?;
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for convenience:
//!
//! - `mailseal::core` - policies, canonical hashing, envelope/container
//! - `mailseal::cache` - durable credential cache
//! - `mailseal::session` - interactive disclosure sessions
//! - `mailseal::pipeline` - seal/unseal orchestration

pub mod app;
pub mod config;
pub mod error;

// Re-export component crates
pub use mailseal_cache as cache;
pub use mailseal_core as core;
pub use mailseal_pipeline as pipeline;
pub use mailseal_session as session;

// Re-export main types for convenience
pub use app::{Collaborators, MailSeal, SendDecision};
pub use config::MailSealConfig;
pub use error::{MailSealError, Result};

// Re-export commonly used types
pub use mailseal_core::{
    AttributeRequest, Conjunction, Policy, PolicyBuilder, PolicyHash, RecipientId,
    SigningIdentity, ATTRIBUTE_EMAIL,
};
pub use mailseal_pipeline::{
    ComposeDetails, DeliveredMessage, Notice, PipelineError, SendGate, TabStateRegistry,
};
pub use mailseal_session::{DisclosureKind, SessionInit, SessionOutcome};
