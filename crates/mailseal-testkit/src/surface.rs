//! A disclosure surface that always completes.
//!
//! Stands in for a cooperative user: whatever conjunction the session
//! asks for is "disclosed", and the minted token claims exactly the
//! hinted attributes — which is what the mock key service derives keys
//! from. Use [`mailseal_session::MemorySurface`] instead when a test
//! needs closures, abandonment, or held sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mailseal_session::{
    Result, SessionInit, SessionOutcome, SurfaceProvider, SurfaceSession,
};

use crate::token::mint_bearer;

/// Surface provider that grants every request.
pub struct GrantingSurface {
    exp: i64,
    opens: AtomicUsize,
    last_init: Mutex<Option<SessionInit>>,
}

impl GrantingSurface {
    /// Tokens minted by this surface expire at `exp` (epoch seconds).
    pub fn new(exp: i64) -> Self {
        Self {
            exp,
            opens: AtomicUsize::new(0),
            last_init: Mutex::new(None),
        }
    }

    /// How many surfaces have been opened.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The most recent init message, if any.
    pub fn last_init(&self) -> Option<SessionInit> {
        self.last_init.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SurfaceProvider for GrantingSurface {
    async fn open(&self, init: SessionInit) -> Result<SurfaceSession> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        // The disclosed conjunction is what the surface showed: the
        // hints when present, the requested conjunction otherwise.
        let disclosed = init.hints.clone().unwrap_or_else(|| init.conjunction.clone());
        *self.last_init.lock().expect("lock") = Some(init);

        let (tx, session) = SurfaceSession::channel();
        let _ = tx.send(SessionOutcome::Credential(mint_bearer(&disclosed, self.exp)));
        Ok(session)
    }
}
