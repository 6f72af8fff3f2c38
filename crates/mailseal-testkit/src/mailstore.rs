//! An in-memory mail store.
//!
//! Folders, messages, a displayed-message slot, and failure injection
//! for the relocation-query and archival paths. Imported messages get
//! their headers parsed back out of the raw bytes, so a message written
//! by the envelope builder can be found again by the relocation query.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;

use mailseal_core::{chunk, chunk_channel, ChunkReceiver};
use mailseal_pipeline::{
    Badge, FolderId, MailStore, MessageHeader, MessageId, MessageQuery, PipelineError, Result,
};

/// A stored message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub header: MessageHeader,
    pub raw: Bytes,
    /// Ciphertext of the sealed attachment, when the message carries one.
    pub sealed: Option<Bytes>,
    pub badges: Vec<Badge>,
}

#[derive(Default)]
struct Inner {
    next_id: MessageId,
    messages: HashMap<MessageId, StoredMessage>,
    folders: Vec<FolderId>,
    displayed: Option<MessageId>,
    failing_queries: u32,
    fail_import: bool,
}

/// In-memory mail store implementation.
#[derive(Default)]
pub struct MemoryMailStore {
    inner: Mutex<Inner>,
}

impl MemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message carrying a sealed attachment, e.g. an incoming
    /// ciphertext mail.
    pub fn add_sealed_message(
        &self,
        folder: &str,
        author: &str,
        recipients: &[&str],
        date: i64,
        ciphertext: Bytes,
    ) -> MessageId {
        let mut inner = self.inner.lock().expect("mail store lock");
        inner.next_id += 1;
        let id = inner.next_id;
        let folder = FolderId(folder.to_owned());
        if !inner.folders.contains(&folder) {
            inner.folders.push(folder.clone());
        }
        inner.messages.insert(
            id,
            StoredMessage {
                header: MessageHeader {
                    id,
                    folder,
                    author: author.to_owned(),
                    recipients: recipients.iter().map(|r| r.to_string()).collect(),
                    subject: "MailSeal Encrypted Message".to_owned(),
                    date,
                },
                raw: Bytes::new(),
                sealed: Some(ciphertext),
                badges: Vec::new(),
            },
        );
        id
    }

    /// Mark a message as the displayed one.
    pub fn set_displayed(&self, id: Option<MessageId>) {
        self.inner.lock().expect("mail store lock").displayed = id;
    }

    /// Make the next `n` relocation queries fail. `u32::MAX` means every
    /// query fails.
    pub fn fail_queries(&self, n: u32) {
        self.inner.lock().expect("mail store lock").failing_queries = n;
    }

    /// Make imports fail, for exercising archival/delivery failures.
    pub fn fail_imports(&self, fail: bool) {
        self.inner.lock().expect("mail store lock").fail_import = fail;
    }

    /// Whether the message still exists.
    pub fn contains(&self, id: MessageId) -> bool {
        self.inner
            .lock()
            .expect("mail store lock")
            .messages
            .contains_key(&id)
    }

    /// Snapshot of a stored message.
    pub fn stored(&self, id: MessageId) -> Option<StoredMessage> {
        self.inner
            .lock()
            .expect("mail store lock")
            .messages
            .get(&id)
            .cloned()
    }

    /// Ids of the messages currently in a folder.
    pub fn messages_in(&self, folder: &str) -> Vec<MessageId> {
        let folder = FolderId(folder.to_owned());
        let inner = self.inner.lock().expect("mail store lock");
        let mut ids: Vec<MessageId> = inner
            .messages
            .values()
            .filter(|m| m.header.folder == folder)
            .map(|m| m.header.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The currently displayed message.
    pub fn displayed(&self) -> Option<MessageId> {
        self.inner.lock().expect("mail store lock").displayed
    }
}

/// Pull subject, author, recipients, and date back out of raw envelope
/// bytes.
fn parse_headers(raw: &[u8]) -> (String, String, Vec<String>, i64) {
    let text = String::from_utf8_lossy(raw);
    let mut subject = String::new();
    let mut author = String::new();
    let mut recipients = Vec::new();
    let mut date = 0i64;

    for line in text.split("\r\n") {
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Subject: ") {
            subject = value.to_owned();
        } else if let Some(value) = line.strip_prefix("From: ") {
            author = value.to_owned();
        } else if let Some(value) = line.strip_prefix("To: ") {
            recipients = value.split(", ").map(str::to_owned).collect();
        } else if let Some(value) = line.strip_prefix("Date: ") {
            if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
                date = parsed.timestamp();
            }
        }
    }

    (subject, author, recipients, date)
}

#[async_trait]
impl MailStore for MemoryMailStore {
    async fn message(&self, id: MessageId) -> Result<MessageHeader> {
        self.inner
            .lock()
            .expect("mail store lock")
            .messages
            .get(&id)
            .map(|m| m.header.clone())
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))
    }

    async fn displayed_message(&self) -> Result<Option<MessageId>> {
        Ok(self.inner.lock().expect("mail store lock").displayed)
    }

    async fn is_sealed(&self, id: MessageId) -> Result<bool> {
        self.inner
            .lock()
            .expect("mail store lock")
            .messages
            .get(&id)
            .map(|m| m.sealed.is_some())
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))
    }

    async fn was_sealed(&self, id: MessageId) -> Result<bool> {
        let inner = self.inner.lock().expect("mail store lock");
        let message = inner
            .messages
            .get(&id)
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))?;
        let marker = format!("{}: ", mailseal_core::MARKER_HEADER);
        Ok(message.sealed.is_some()
            || String::from_utf8_lossy(&message.raw).contains(&marker))
    }

    async fn sealed_attachment(&self, id: MessageId) -> Result<Option<ChunkReceiver>> {
        let sealed = self
            .inner
            .lock()
            .expect("mail store lock")
            .messages
            .get(&id)
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))?
            .sealed
            .clone();

        Ok(sealed.map(|bytes| {
            let (tx, rx) = chunk_channel();
            tokio::spawn(async move {
                chunk::send_split(&tx, bytes, 1024).await;
            });
            rx
        }))
    }

    async fn local_folder(&self, name: &str) -> Result<FolderId> {
        let mut inner = self.inner.lock().expect("mail store lock");
        let folder = FolderId(name.to_owned());
        if !inner.folders.contains(&folder) {
            inner.folders.push(folder.clone());
        }
        Ok(folder)
    }

    async fn import(&self, folder: &FolderId, data: Bytes) -> Result<MessageId> {
        let mut inner = self.inner.lock().expect("mail store lock");
        if inner.fail_import {
            return Err(PipelineError::Persistence("import failed".into()));
        }
        if !inner.folders.contains(folder) {
            return Err(PipelineError::Persistence(format!(
                "folder {} does not exist",
                folder.0
            )));
        }

        let (subject, author, recipients, date) = parse_headers(&data);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(
            id,
            StoredMessage {
                header: MessageHeader {
                    id,
                    folder: folder.clone(),
                    author,
                    recipients,
                    subject,
                    date,
                },
                raw: data,
                sealed: None,
                badges: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn move_message(&self, id: MessageId, folder: &FolderId) -> Result<()> {
        let mut inner = self.inner.lock().expect("mail store lock");
        if !inner.folders.contains(folder) {
            inner.folders.push(folder.clone());
        }
        inner
            .messages
            .get_mut(&id)
            .map(|m| m.header.folder = folder.clone())
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))
    }

    async fn delete_message(&self, id: MessageId) -> Result<()> {
        let mut inner = self.inner.lock().expect("mail store lock");
        inner
            .messages
            .remove(&id)
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))?;
        if inner.displayed == Some(id) {
            inner.displayed = None;
        }
        Ok(())
    }

    async fn query(&self, query: &MessageQuery) -> Result<Vec<MessageId>> {
        let mut inner = self.inner.lock().expect("mail store lock");
        if inner.failing_queries > 0 {
            if inner.failing_queries != u32::MAX {
                inner.failing_queries -= 1;
            }
            return Err(PipelineError::Persistence("query backend unavailable".into()));
        }

        let mut found: Vec<MessageId> = inner
            .messages
            .values()
            .filter(|m| {
                m.header.folder == query.folder
                    && m.header.subject == query.subject
                    && m.header.author == query.author
                    && m.header.recipients == query.recipients
                    && m.header.date >= query.from_date
                    && m.header.date <= query.to_date
            })
            .map(|m| m.header.id)
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    async fn select_message(&self, id: MessageId) -> Result<()> {
        let mut inner = self.inner.lock().expect("mail store lock");
        if !inner.messages.contains_key(&id) {
            return Err(PipelineError::Persistence(format!("message {id} not found")));
        }
        inner.displayed = Some(id);
        Ok(())
    }

    async fn set_badges(&self, id: MessageId, badges: Vec<Badge>) -> Result<()> {
        self.inner
            .lock()
            .expect("mail store lock")
            .messages
            .get_mut(&id)
            .map(|m| m.badges = badges)
            .ok_or_else(|| PipelineError::Persistence(format!("message {id} not found")))
    }
}
