//! Error types for the MailSeal facade.

use thiserror::Error;

use mailseal_cache::CacheError;
use mailseal_pipeline::PipelineError;

/// Errors that can occur at the facade level.
#[derive(Debug, Error)]
pub enum MailSealError {
    /// Startup or wiring problem (e.g. no master key available from the
    /// key service or the durable cache).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pipeline run failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The durable cache failed outside a pipeline run.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, MailSealError>;
