//! Error types for MailSeal core.

use thiserror::Error;

/// Errors from pure core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("empty conjunction for recipient {0}")]
    EmptyConjunction(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unsupported container version: {0}")]
    UnsupportedVersion(u8),

    #[error("container stream ended before the header was complete")]
    TruncatedContainer,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}
