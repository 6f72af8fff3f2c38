//! Deterministic plaintext envelope construction.
//!
//! The envelope is the exact byte sequence that gets sealed and signed,
//! so field order, line endings, and encodings must be stable: the same
//! inputs always produce the same bytes. CRLF throughout; header fields
//! in fixed order; attachments as base64 parts of a `multipart/mixed`
//! structure.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::error::CoreError;

/// Header marking a message as having been sealed by this system.
/// Survives in the plaintext envelope, so a delivered (decrypted) message
/// is still recognizable as one that was once sealed.
pub const MARKER_HEADER: &str = "X-MailSeal";

/// Envelope format version carried in the marker header.
pub const MARKER_VERSION: &str = "0.1";

/// An attachment to embed in the envelope.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Builder for the deterministic envelope.
///
/// The timestamp is injected; the builder never reads the clock. The
/// multipart boundary is random by default but injectable, which keeps
/// golden tests byte-stable.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    timestamp: i64,
    body: String,
    plain_text: bool,
    attachments: Vec<Attachment>,
    boundary: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(from: impl Into<String>, timestamp: i64) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            subject: String::new(),
            timestamp,
            body: String::new(),
            plain_text: true,
            attachments: Vec::new(),
            boundary: None,
        }
    }

    pub fn to(mut self, to: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to = to.into_iter().map(Into::into).collect();
        self
    }

    pub fn cc(mut self, cc: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cc = cc.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn plain_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.plain_text = true;
        self
    }

    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.plain_text = false;
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Pin the multipart boundary (tests only need this for stability).
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Build the envelope bytes.
    pub fn build(self) -> Result<Bytes, CoreError> {
        let date = DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .ok_or(CoreError::InvalidTimestamp(self.timestamp))?;

        let inner_content_type = format!(
            "{}; charset=utf-8",
            if self.plain_text { "text/plain" } else { "text/html" }
        );

        let boundary = if self.attachments.is_empty() {
            None
        } else {
            Some(self.boundary.unwrap_or_else(random_boundary))
        };

        let content_type = match &boundary {
            Some(b) => format!("multipart/mixed; boundary=\"{b}\""),
            None => inner_content_type.clone(),
        };

        let mut out = String::new();
        out.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        if !self.cc.is_empty() {
            out.push_str(&format!("Cc: {}\r\n", self.cc.join(", ")));
        }
        out.push_str(&format!("Content-Type: {content_type}\r\n"));
        out.push_str(&format!("{MARKER_HEADER}: {MARKER_VERSION}\r\n"));
        out.push_str("\r\n");

        match &boundary {
            None => out.push_str(&self.body),
            Some(b) => {
                out.push_str(&format!(
                    "--{b}\r\nContent-Type: {inner_content_type}\r\n\r\n{}\r\n",
                    self.body
                ));
                let last = self.attachments.len() - 1;
                for (i, att) in self.attachments.iter().enumerate() {
                    out.push_str(&format!(
                        "--{b}\r\nContent-Type: {}; name=\"{}\"\r\n",
                        att.content_type, att.name
                    ));
                    out.push_str(&format!(
                        "Content-Disposition: attachment; filename=\"{}\"\r\n",
                        att.name
                    ));
                    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
                    out.push_str(&wrap_base64(&att.data));
                    if i == last {
                        out.push_str(&format!("\r\n--{b}--\r\n"));
                    } else {
                        out.push_str("\r\n");
                    }
                }
            }
        }

        Ok(Bytes::from(out))
    }
}

/// A random 32-hex-character multipart boundary.
pub fn random_boundary() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Base64-encode with lines wrapped at 76 columns, CRLF separators.
fn wrap_base64(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / 38);
    let mut rest = encoded.as_str();
    while rest.len() > 76 {
        let (line, tail) = rest.split_at(76);
        wrapped.push_str(line);
        wrapped.push_str("\r\n");
        rest = tail;
    }
    wrapped.push_str(rest);
    wrapped
}
