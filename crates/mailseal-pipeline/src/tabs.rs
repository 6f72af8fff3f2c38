//! Per-compose-tab state.
//!
//! One entry per open compose tab, inserted when the tab opens and
//! purged unconditionally when it closes. The registry is injected into
//! whatever owns the tab lifecycle; nothing here is a module-level
//! singleton.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use mailseal_core::{Conjunction, RecipientId};

use crate::mailstore::MessageId;
use crate::notify::NotificationId;

/// Host-assigned compose tab identifier.
pub type TabId = u32;

/// Host-assigned popup window identifier.
pub type PopupId = u32;

/// State for one open compose tab.
#[derive(Debug, Clone, Default)]
pub struct ComposeTabState {
    /// Whether this send will be sealed.
    pub encrypt: bool,
    /// Per-recipient attribute overrides chosen in the config popup.
    pub policy_override: Option<BTreeMap<RecipientId, Conjunction>>,
    /// Private signing attributes chosen in the sign popup.
    pub sign_override: Option<Conjunction>,
    /// The configuration popup currently open for this tab, if any.
    pub open_popup: Option<PopupId>,
    /// A pending clearable warning (e.g. the bcc warning).
    pub pending_notification: Option<NotificationId>,
    /// The archived plaintext copy created during the last seal.
    pub archived_copy: Option<MessageId>,
}

/// What the send gate decided for a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendGate {
    /// Sealing is off for this tab; send passes through untouched.
    Passthrough,
    /// Seal and send.
    Seal,
    /// A configuration popup is open: re-focus it and abort the send.
    PopupOpen(PopupId),
}

/// Registry of compose-tab state, keyed by tab id.
#[derive(Debug, Default)]
pub struct TabStateRegistry {
    tabs: Mutex<HashMap<TabId, ComposeTabState>>,
}

impl TabStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened compose tab.
    pub fn insert(&self, tab: TabId, encrypt: bool) {
        let mut tabs = self.tabs.lock().expect("tab registry lock");
        tabs.insert(
            tab,
            ComposeTabState {
                encrypt,
                ..Default::default()
            },
        );
    }

    /// Purge a closed tab. Unconditional; unknown ids are a no-op.
    pub fn remove(&self, tab: TabId) {
        self.tabs.lock().expect("tab registry lock").remove(&tab);
    }

    /// Snapshot of one tab's state.
    pub fn get(&self, tab: TabId) -> Option<ComposeTabState> {
        self.tabs.lock().expect("tab registry lock").get(&tab).cloned()
    }

    pub fn len(&self) -> usize {
        self.tabs.lock().expect("tab registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Toggle sealing for a tab.
    ///
    /// Disabling clears any pending warning; the cleared notification id
    /// is returned so the caller can dismiss it in the UI.
    pub fn set_encrypt(&self, tab: TabId, enabled: bool) -> Option<NotificationId> {
        let mut tabs = self.tabs.lock().expect("tab registry lock");
        let state = tabs.get_mut(&tab)?;
        state.encrypt = enabled;
        if !enabled {
            state.pending_notification.take()
        } else {
            None
        }
    }

    pub fn set_policy_override(
        &self,
        tab: TabId,
        overrides: BTreeMap<RecipientId, Conjunction>,
    ) {
        if let Some(state) = self.tabs.lock().expect("tab registry lock").get_mut(&tab) {
            state.policy_override = Some(overrides);
        }
    }

    pub fn set_sign_override(&self, tab: TabId, attrs: Conjunction) {
        if let Some(state) = self.tabs.lock().expect("tab registry lock").get_mut(&tab) {
            state.sign_override = Some(attrs);
        }
    }

    pub fn set_open_popup(&self, tab: TabId, popup: Option<PopupId>) {
        if let Some(state) = self.tabs.lock().expect("tab registry lock").get_mut(&tab) {
            state.open_popup = popup;
        }
    }

    pub fn set_pending_notification(&self, tab: TabId, id: Option<NotificationId>) {
        if let Some(state) = self.tabs.lock().expect("tab registry lock").get_mut(&tab) {
            state.pending_notification = id;
        }
    }

    pub fn set_archived_copy(&self, tab: TabId, id: MessageId) {
        if let Some(state) = self.tabs.lock().expect("tab registry lock").get_mut(&tab) {
            state.archived_copy = Some(id);
        }
    }

    /// Decide whether a send may proceed for this tab.
    pub fn send_gate(&self, tab: TabId) -> SendGate {
        let tabs = self.tabs.lock().expect("tab registry lock");
        match tabs.get(&tab) {
            None => SendGate::Passthrough,
            Some(state) => {
                if let Some(popup) = state.open_popup {
                    SendGate::PopupOpen(popup)
                } else if state.encrypt {
                    SendGate::Seal
                } else {
                    SendGate::Passthrough
                }
            }
        }
    }
}
