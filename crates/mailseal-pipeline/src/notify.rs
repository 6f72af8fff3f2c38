//! User-visible notifications, as a trait.
//!
//! Rendering is the host's concern. The pipelines only distinguish the
//! notices the design requires distinct messages for, and track ids so
//! clearable warnings can be dismissed.

use async_trait::async_trait;

use crate::tabs::PopupId;

/// Host-assigned notification identifier.
pub type NotificationId = u32;

/// The notices this system can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Decryption failed (crypto, key service, or delivery failure).
    DecryptionFailed,
    /// The local identity is not among the message's recipients.
    RecipientUnknown,
    /// A send with bcc recipients was blocked.
    BccWarning,
}

/// Sink for user-visible notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a dismissible warning; returns its id so it can be cleared.
    async fn warn(&self, notice: Notice) -> NotificationId;

    /// Show an error notice.
    async fn error(&self, notice: Notice);

    /// Clear a previously shown warning.
    async fn clear(&self, id: NotificationId);

    /// Bring an already-open configuration popup to the front.
    async fn refocus_popup(&self, popup: PopupId);
}
