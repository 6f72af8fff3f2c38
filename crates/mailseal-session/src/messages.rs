//! The two-message surface exchange: init and done.

use serde::{Deserialize, Serialize};

use mailseal_core::{Conjunction, RecipientId};

/// What kind of key the disclosure session is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisclosureKind {
    Decryption,
    Signing,
}

/// **init**: coordinator -> surface. Everything the surface needs to run
/// one disclosure session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    /// The conjunction the credential must satisfy.
    pub conjunction: Conjunction,

    /// Decryption or Signing.
    pub kind: DisclosureKind,

    /// Display hints: the hidden-policy attributes with their embedded
    /// values, for rendering only. Never used for matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Conjunction>,

    /// The sender of the message being decrypted, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<RecipientId>,
}

impl SessionInit {
    /// An init with only the mandatory fields.
    pub fn new(conjunction: Conjunction, kind: DisclosureKind) -> Self {
        Self {
            conjunction,
            kind,
            hints: None,
            sender: None,
        }
    }

    pub fn with_hints(mut self, hints: Conjunction) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn with_sender(mut self, sender: RecipientId) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// **done**: surface -> coordinator. The terminal message of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// Disclosure completed; the bearer token proving it.
    Credential(String),
    /// The user walked away without completing the session.
    Abandoned,
}
