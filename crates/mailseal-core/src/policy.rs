//! Recipient policies and policy construction.
//!
//! A [`Policy`] maps each intended recipient to the access condition and
//! timestamp the message is sealed under. [`PolicyBuilder`] derives the
//! per-recipient conjunctions from the compose details, applying overrides
//! with forced normalization of email-typed attributes so a differently
//! cased address can never produce a divergent policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::attributes::{AttributeRequest, Conjunction};
use crate::error::CoreError;

/// A canonical recipient identifier: the lower-cased email address with
/// any display name stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipientId(String);

impl RecipientId {
    /// Canonicalize a compose-style address (`Display Name <A@B.example>`
    /// or a bare address) into a recipient id.
    pub fn canonicalize(address: &str) -> Self {
        let trimmed = address.trim();
        let inner = match (trimmed.rfind('<'), trimmed.rfind('>')) {
            (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
            _ => trimmed,
        };
        Self(inner.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecipientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-recipient encryption parameters: the seal timestamp (epoch
/// seconds) and the access conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Seal timestamp in epoch seconds. Decryption keys are requested
    /// for exactly this timestamp.
    #[serde(rename = "ts")]
    pub timestamp: i64,

    /// The recipient's access condition.
    #[serde(rename = "con")]
    pub conjunction: Conjunction,
}

/// Encryption parameters for every intended recipient, as an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy(pub BTreeMap<RecipientId, PolicyEntry>);

/// A policy recovered from a ciphertext container header. Same shape as
/// [`Policy`], read-only by convention.
pub type HiddenPolicy = Policy;

impl Policy {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, id: RecipientId, entry: PolicyEntry) {
        self.0.insert(id, entry);
    }

    pub fn get(&self, id: &RecipientId) -> Option<&PolicyEntry> {
        self.0.get(id)
    }

    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, RecipientId, PolicyEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &RecipientId> {
        self.0.keys()
    }
}

/// Builds the per-recipient encryption policy for one outgoing message.
///
/// Defaults each recipient to a single email attribute asserting their
/// canonical address. Overrides replace the default, but any email-typed
/// attribute inside an override is rewritten to the recipient's canonical
/// address: the override chooses *which* attributes gate access, never
/// *whose* mailbox they are pinned to.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    timestamp: i64,
    overrides: BTreeMap<RecipientId, Conjunction>,
}

impl PolicyBuilder {
    /// Start building a policy sealed at the given epoch-seconds timestamp.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            overrides: BTreeMap::new(),
        }
    }

    /// Set an attribute override for one recipient.
    pub fn override_for(mut self, recipient: &str, conjunction: Conjunction) -> Self {
        self.overrides
            .insert(RecipientId::canonicalize(recipient), conjunction);
        self
    }

    /// Build the policy for the given to+cc recipient list.
    ///
    /// An override that leaves a recipient's conjunction empty is
    /// rejected: an empty conjunction would be an unrestricted policy,
    /// which is never what a sender intends.
    pub fn build<I, S>(&self, recipients: I) -> Result<Policy, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Policy::new();

        for recipient in recipients {
            let id = RecipientId::canonicalize(recipient.as_ref());

            let conjunction = match self.overrides.get(&id) {
                Some(overridden) => {
                    if overridden.is_empty() {
                        return Err(CoreError::EmptyConjunction(id.to_string()));
                    }
                    normalize_email_attributes(overridden, &id)
                }
                None => Conjunction(vec![AttributeRequest::email(id.as_str())]),
            };

            policy.insert(
                id,
                PolicyEntry {
                    timestamp: self.timestamp,
                    conjunction,
                },
            );
        }

        Ok(policy)
    }
}

/// The signing identity for one outgoing message: the public conjunction
/// (always the sender's canonical email) plus optional private attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    /// Public part, visible to every recipient after unsealing.
    #[serde(rename = "pubSignId")]
    pub public: Conjunction,

    /// Private part, disclosed only to recipients. Never contains an
    /// email-typed attribute.
    #[serde(rename = "privSignId", default, skip_serializing_if = "Option::is_none")]
    pub private: Option<Conjunction>,
}

impl SigningIdentity {
    /// Derive the signing identity for a sender.
    ///
    /// The public conjunction is exactly the sender's canonical email.
    /// Private attributes are appended after filtering out email-typed
    /// ones; they supplement the public conjunction, never replace it.
    pub fn derive(sender: &str, private_attrs: Option<&Conjunction>) -> Self {
        let id = RecipientId::canonicalize(sender);
        let public = Conjunction(vec![AttributeRequest::email(id.as_str())]);

        let private = private_attrs.and_then(|attrs| {
            let filtered: Vec<AttributeRequest> = attrs
                .iter()
                .filter(|a| !a.is_email())
                .cloned()
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(Conjunction(filtered))
            }
        });

        Self { public, private }
    }

    /// The combined conjunction (public then private) used for the
    /// credential lookup and the disclosure session.
    pub fn combined(&self) -> Conjunction {
        let mut attrs = self.public.0.clone();
        if let Some(private) = &self.private {
            attrs.extend(private.0.iter().cloned());
        }
        Conjunction(attrs)
    }
}

/// Rewrite every email-typed attribute to the verified canonical address.
pub fn normalize_email_attributes(con: &Conjunction, verified: &RecipientId) -> Conjunction {
    con.iter()
        .map(|attr| {
            if attr.is_email() {
                AttributeRequest::email(verified.as_str())
            } else {
                attr.clone()
            }
        })
        .collect()
}

/// Convert a hidden-policy conjunction into the key request used for a
/// disclosure session.
///
/// The embedded email value is never trusted for the match itself: it is
/// replaced with the verified local identity. Empty or wildcard values
/// become value-less requests, letting the holder pick the concrete
/// value during disclosure.
pub fn key_request_conjunction(hidden: &Conjunction, verified: &RecipientId) -> Conjunction {
    hidden
        .iter()
        .map(|attr| {
            if attr.is_email() {
                AttributeRequest::email(verified.as_str())
            } else {
                match &attr.value {
                    Some(v) if v.is_empty() || v.contains('*') => {
                        AttributeRequest::any(attr.atype.clone())
                    }
                    _ => attr.clone(),
                }
            }
        })
        .collect()
}

/// Convert a hidden-policy conjunction into display hints for the
/// disclosure surface: embedded values are kept, except email-typed ones
/// which show the verified local address.
pub fn hint_conjunction(hidden: &Conjunction, verified: &RecipientId) -> Conjunction {
    normalize_email_attributes(hidden, verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_display_name() {
        let id = RecipientId::canonicalize("Alice Example <Alice@Example.COM>");
        assert_eq!(id.as_str(), "alice@example.com");
    }

    #[test]
    fn test_canonicalize_bare_address() {
        let id = RecipientId::canonicalize("  BOB@Example.com ");
        assert_eq!(id.as_str(), "bob@example.com");
    }

    #[test]
    fn test_default_policy_uses_email_attribute() {
        let policy = PolicyBuilder::new(1736870400)
            .build(["Alice <alice@example.com>", "bob@example.com"])
            .unwrap();

        assert_eq!(policy.len(), 2);
        let alice = policy
            .get(&RecipientId::canonicalize("alice@example.com"))
            .unwrap();
        assert_eq!(alice.timestamp, 1736870400);
        assert_eq!(
            alice.conjunction,
            Conjunction(vec![AttributeRequest::email("alice@example.com")])
        );
    }

    #[test]
    fn test_override_replaces_default() {
        let over = Conjunction(vec![AttributeRequest::new("attr.age", "18")]);
        let policy = PolicyBuilder::new(100)
            .override_for("a@example.com", over.clone())
            .build(["a@example.com"])
            .unwrap();

        let entry = policy
            .get(&RecipientId::canonicalize("a@example.com"))
            .unwrap();
        assert_eq!(entry.conjunction, over);
    }

    #[test]
    fn test_override_email_value_is_forced_canonical() {
        // An override carrying a miscased email must not survive as-is.
        let over = Conjunction(vec![
            AttributeRequest::email("A@Example.Com"),
            AttributeRequest::new("attr.age", "18"),
        ]);
        let policy = PolicyBuilder::new(100)
            .override_for("a@example.com", over)
            .build(["a@example.com"])
            .unwrap();

        let entry = policy
            .get(&RecipientId::canonicalize("a@example.com"))
            .unwrap();
        assert!(entry
            .conjunction
            .iter()
            .any(|a| a.is_email() && a.value.as_deref() == Some("a@example.com")));
    }

    #[test]
    fn test_empty_override_is_rejected() {
        let result = PolicyBuilder::new(100)
            .override_for("a@example.com", Conjunction::new())
            .build(["a@example.com"]);
        assert!(matches!(result, Err(CoreError::EmptyConjunction(_))));
    }

    #[test]
    fn test_signing_identity_public_is_never_replaced() {
        let private = Conjunction(vec![
            AttributeRequest::email("spoof@example.com"),
            AttributeRequest::new("attr.org", "acme"),
        ]);
        let identity = SigningIdentity::derive("Carol <CAROL@example.com>", Some(&private));

        assert_eq!(
            identity.public,
            Conjunction(vec![AttributeRequest::email("carol@example.com")])
        );
        // Email-typed private attributes are filtered out.
        let private = identity.private.unwrap();
        assert_eq!(private.len(), 1);
        assert_eq!(private.0[0].atype, "attr.org");
    }

    #[test]
    fn test_signing_identity_combined_order() {
        let private = Conjunction(vec![AttributeRequest::new("attr.org", "acme")]);
        let identity = SigningIdentity::derive("carol@example.com", Some(&private));
        let combined = identity.combined();
        assert_eq!(combined.len(), 2);
        assert!(combined.0[0].is_email());
    }

    #[test]
    fn test_key_request_wildcards_become_valueless() {
        let verified = RecipientId::canonicalize("a@example.com");
        let hidden = Conjunction(vec![
            AttributeRequest::email("stale-hint@example.com"),
            AttributeRequest::new("attr.city", "*"),
            AttributeRequest::new("attr.age", ""),
            AttributeRequest::new("attr.org", "acme"),
        ]);

        let request = key_request_conjunction(&hidden, &verified);
        assert_eq!(request.0[0], AttributeRequest::email("a@example.com"));
        assert_eq!(request.0[1], AttributeRequest::any("attr.city"));
        assert_eq!(request.0[2], AttributeRequest::any("attr.age"));
        assert_eq!(request.0[3], AttributeRequest::new("attr.org", "acme"));
    }

    #[test]
    fn test_hints_keep_values_except_email() {
        let verified = RecipientId::canonicalize("a@example.com");
        let hidden = Conjunction(vec![
            AttributeRequest::email("other@example.com"),
            AttributeRequest::new("attr.city", "*"),
        ]);

        let hints = hint_conjunction(&hidden, &verified);
        assert_eq!(hints.0[0], AttributeRequest::email("a@example.com"));
        assert_eq!(hints.0[1], AttributeRequest::new("attr.city", "*"));
    }
}
