//! Error types for the credential cache.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The credential's claims segment could not be decoded.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the store was poisoned.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// Background task running the blocking operation was cancelled.
    #[error("blocking task failed: {0}")]
    TaskFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
