//! Error types for the seal/unseal pipelines.

use thiserror::Error;

use mailseal_cache::CacheError;
use mailseal_core::CoreError;
use mailseal_session::SessionError;

use crate::engine::EngineError;
use crate::mailstore::MessageId;

/// Errors that can abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or inconsistent configuration (no master key, empty
    /// override conjunction, message without a sealed attachment).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The local identity does not appear in the hidden policy.
    #[error("recipient {0} not found in the message's hidden policy")]
    RecipientUnknown(String),

    /// The disclosure surface was closed or abandoned before done.
    #[error("disclosure session cancelled")]
    SessionCancelled,

    /// The disclosure surface could not be opened.
    #[error("disclosure surface error: {0}")]
    Surface(String),

    /// Bad status from the key service, or a transport failure.
    #[error("remote key service error: {0}")]
    RemoteKeyService(String),

    /// Seal/unseal failure, including sender-verification mismatch.
    #[error("crypto primitive error: {0}")]
    CryptoPrimitive(#[from] EngineError),

    /// A decryption is already in flight; decryption never queues.
    #[error("a decryption is already in flight")]
    Concurrency,

    /// The target message is not the currently displayed one.
    #[error("message {0} is not the displayed message")]
    NotDisplayed(MessageId),

    /// Mail-store failure. Fatal for received-copy delivery; swallowed
    /// and logged for sent-copy archival.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Credential cache failure.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Core encoding/decoding failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<SessionError> for PipelineError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Cancelled => PipelineError::SessionCancelled,
            SessionError::Surface(msg) => PipelineError::Surface(msg),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
