//! Error types for disclosure sessions.

use thiserror::Error;

/// Errors that can occur while obtaining a credential interactively.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The surface was closed (or the request abandoned) before a
    /// credential was produced.
    #[error("disclosure session cancelled")]
    Cancelled,

    /// The surface could not be opened.
    #[error("disclosure surface error: {0}")]
    Surface(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
