//! # MailSeal Pipeline
//!
//! The encryption/decryption orchestration layer: the seal and unseal
//! pipelines, the credential resolver they share, the compose-tab
//! registry, and the traits for every external collaborator (key
//! service, crypto primitive, mail store, notifications).
//!
//! ## Ordering and concurrency
//!
//! Within one pipeline run, steps are strictly sequential — each depends
//! on the previous result. Seal runs may proceed concurrently per tab;
//! decryption is globally single-flight via [`DecryptSlot`]: a second
//! start while one is active fails with
//! [`PipelineError::Concurrency`], it never queues.
//!
//! ## Failure semantics
//!
//! A pipeline failure aborts only that run and leaves the pre-operation
//! state in place: no partial ciphertext ever replaces a draft, no
//! ciphertext message is deleted before its plaintext replacement is
//! durably persisted. Best-effort side effects (sent-copy archival,
//! badges, selection) log and continue.

pub mod engine;
pub mod error;
pub mod keyservice;
pub mod mailstore;
pub mod notify;
pub mod resolver;
pub mod seal;
pub mod tabs;
pub mod unseal;

pub use engine::{EngineError, SealEngine, SealOptions, SenderIdentity, Unsealer};
pub use error::{PipelineError, Result};
pub use keyservice::{
    DecryptionKey, KeyResponse, KeyService, MasterPublicKey, SigningKeyResponse, SigningKeys,
    VerificationKey, PROOF_VALID, STATUS_DONE,
};
pub use mailstore::{
    badge_kind, Badge, ComposeDetails, FolderId, MailStore, MessageHeader, MessageId,
    MessageQuery,
};
pub use notify::{Notice, NotificationId, Notifier};
pub use resolver::{CredentialResolver, Resolved};
pub use seal::{SealConfig, SealPipeline, SealRequest, SealedMessage};
pub use tabs::{ComposeTabState, PopupId, SendGate, TabId, TabStateRegistry};
pub use unseal::{DecryptSlot, DeliveredMessage, UnsealConfig, UnsealPipeline, UnsealState};
