//! The host mail client, as a trait.
//!
//! The pipelines never touch folders, messages, or attachments directly;
//! they go through this interface. The testkit provides an in-memory
//! implementation; production binds it to the real client's APIs.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use mailseal_core::{Attachment, ChunkReceiver};

use crate::error::Result;

/// Host-assigned message identifier.
pub type MessageId = u64;

/// A folder in the host's message store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub String);

/// The subset of a message's header the pipelines need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: MessageId,
    pub folder: FolderId,
    pub author: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Message date, epoch seconds.
    pub date: i64,
}

/// Relocation query: how a just-moved message is found again when the
/// move itself does not report the new identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub folder: FolderId,
    pub subject: String,
    pub recipients: Vec<String>,
    pub author: String,
    /// Inclusive window, epoch seconds.
    pub from_date: i64,
    pub to_date: i64,
}

/// A verified-attribute badge attached to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    /// Display category, derived from the attribute type.
    pub kind: String,
    /// The disclosed value.
    pub value: String,
}

/// Display category for an attribute type.
pub fn badge_kind(atype: &str) -> &'static str {
    match atype {
        mailseal_core::ATTRIBUTE_EMAIL => "envelope",
        "attr.phone" => "phone",
        "attr.birthdate" => "calendar",
        _ => "personal",
    }
}

/// The draft being composed, as handed to the seal pipeline, and the
/// shape it is returned in after sealing.
#[derive(Debug, Clone, Default)]
pub struct ComposeDetails {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub is_plain_text: bool,
    pub attachments: Vec<Attachment>,
}

/// Async interface to the host message store.
///
/// Failures map to [`PipelineError::Persistence`]; implementations are
/// expected to be cancel-safe per call.
///
/// [`PipelineError::Persistence`]: crate::error::PipelineError::Persistence
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Header of an existing message.
    async fn message(&self, id: MessageId) -> Result<MessageHeader>;

    /// The message currently selected/displayed, if any.
    async fn displayed_message(&self) -> Result<Option<MessageId>>;

    /// Whether the message carries a sealed-ciphertext attachment.
    async fn is_sealed(&self, id: MessageId) -> Result<bool>;

    /// Whether the message was once sealed: a delivered plaintext still
    /// carries the envelope marker header.
    async fn was_sealed(&self, id: MessageId) -> Result<bool>;

    /// Open the sealed attachment as a chunk stream.
    ///
    /// `None` when the message has no sealed attachment.
    async fn sealed_attachment(&self, id: MessageId) -> Result<Option<ChunkReceiver>>;

    /// Look up (creating if missing) a dedicated local folder.
    async fn local_folder(&self, name: &str) -> Result<FolderId>;

    /// Import raw message bytes into a folder, returning the new id.
    async fn import(&self, folder: &FolderId, data: Bytes) -> Result<MessageId>;

    /// Move a message between folders. May not report the message's
    /// post-move identity; see [`MessageQuery`].
    async fn move_message(&self, id: MessageId, folder: &FolderId) -> Result<()>;

    /// Permanently delete a message.
    async fn delete_message(&self, id: MessageId) -> Result<()>;

    /// Find messages matching a relocation query.
    async fn query(&self, query: &MessageQuery) -> Result<Vec<MessageId>>;

    /// Select/display a message in the UI.
    async fn select_message(&self, id: MessageId) -> Result<()>;

    /// Attach verified-sender badges to a message's UI state.
    async fn set_badges(&self, id: MessageId, badges: Vec<Badge>) -> Result<()>;
}
