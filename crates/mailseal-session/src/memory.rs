//! A scripted in-memory surface for tests.
//!
//! Plays back a queue of scripted outcomes, one per opened surface, and
//! records every init it receives so tests can assert on what the user
//! would have been shown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::coordinator::{SurfaceProvider, SurfaceSession};
use crate::error::Result;
use crate::messages::{SessionInit, SessionOutcome};

/// One scripted surface behavior.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Complete the session with this bearer token.
    Grant(String),
    /// The user abandons the session (done carries no credential).
    Abandon,
    /// The surface is closed before done.
    Close,
    /// Keep the surface open until the test releases it.
    Hold,
}

/// In-memory surface provider.
pub struct MemorySurface {
    script: Mutex<VecDeque<Scripted>>,
    /// Fallback when the script runs dry; `None` means Close.
    default: Option<String>,
    opened: AtomicUsize,
    last_init: Mutex<Option<SessionInit>>,
    held: Mutex<Vec<oneshot::Sender<SessionOutcome>>>,
}

impl MemorySurface {
    /// A surface that grants the same token for every request.
    pub fn always_grant(bearer: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Some(bearer.into()),
            opened: AtomicUsize::new(0),
            last_init: Mutex::new(None),
            held: Mutex::new(Vec::new()),
        }
    }

    /// A surface that plays back the given outcomes in order, then
    /// closes for any further request.
    pub fn scripted(outcomes: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            default: None,
            opened: AtomicUsize::new(0),
            last_init: Mutex::new(None),
            held: Mutex::new(Vec::new()),
        }
    }

    /// How many surfaces have been opened.
    pub fn opens(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The most recent init message, if any.
    pub fn last_init(&self) -> Option<SessionInit> {
        self.last_init.lock().expect("lock").clone()
    }

    /// Complete every held surface with the given outcome.
    pub fn release_held(&self, outcome: SessionOutcome) {
        let held = std::mem::take(&mut *self.held.lock().expect("lock"));
        for tx in held {
            let _ = tx.send(outcome.clone());
        }
    }

    /// Close every held surface without a done message.
    pub fn close_held(&self) {
        self.held.lock().expect("lock").clear();
    }
}

#[async_trait]
impl SurfaceProvider for MemorySurface {
    async fn open(&self, init: SessionInit) -> Result<SurfaceSession> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_init.lock().expect("lock") = Some(init);

        let next = self
            .script
            .lock()
            .expect("lock")
            .pop_front()
            .or_else(|| self.default.clone().map(Scripted::Grant))
            .unwrap_or(Scripted::Close);

        let (tx, session) = SurfaceSession::channel();
        match next {
            Scripted::Grant(bearer) => {
                let _ = tx.send(SessionOutcome::Credential(bearer));
            }
            Scripted::Abandon => {
                let _ = tx.send(SessionOutcome::Abandoned);
            }
            Scripted::Close => {
                drop(tx);
            }
            Scripted::Hold => {
                self.held.lock().expect("lock").push(tx);
            }
        }
        Ok(session)
    }
}
