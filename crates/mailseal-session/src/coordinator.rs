//! The session coordinator: one surface per request, two messages, no
//! leaks.
//!
//! [`SurfaceProvider`] abstracts whatever renders the interactive
//! disclosure UI. Opening a surface delivers the **init** message; the
//! returned [`SurfaceSession`] resolves with the **done** message. If
//! the surface goes away before done, the oneshot sender is dropped and
//! the pending request fails with a cancellation error. All linkage is
//! owned by the `SurfaceSession`, so both the success and failure paths
//! release it when the value is consumed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Result, SessionError};
use crate::messages::{SessionInit, SessionOutcome};

/// An open surface for exactly one logical request.
#[derive(Debug)]
pub struct SurfaceSession {
    /// Resolves with the surface's **done** message. Dropped sender
    /// means the surface was closed first.
    pub done: oneshot::Receiver<SessionOutcome>,
}

impl SurfaceSession {
    /// Pair a session with the sender its surface will complete it with.
    pub fn channel() -> (oneshot::Sender<SessionOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { done: rx })
    }
}

/// Renders interactive disclosure sessions. One open surface per call.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    /// Open a surface and deliver the init message.
    async fn open(&self, init: SessionInit) -> Result<SurfaceSession>;
}

/// Drives disclosure sessions against a surface provider.
#[derive(Clone)]
pub struct SessionCoordinator {
    provider: Arc<dyn SurfaceProvider>,
}

impl SessionCoordinator {
    pub fn new(provider: Arc<dyn SurfaceProvider>) -> Self {
        Self { provider }
    }

    /// Run one disclosure session to completion.
    ///
    /// Returns the opaque bearer token, or [`SessionError::Cancelled`]
    /// if the surface was closed or the user abandoned the session.
    pub async fn acquire(&self, init: SessionInit) -> Result<String> {
        tracing::debug!(kind = ?init.kind, "opening disclosure surface");
        let session = self.provider.open(init).await?;

        match session.done.await {
            Ok(SessionOutcome::Credential(bearer)) => Ok(bearer),
            Ok(SessionOutcome::Abandoned) => Err(SessionError::Cancelled),
            // Surface closed before sending done.
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}
