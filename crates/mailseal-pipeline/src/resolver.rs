//! Credential resolution: cache first, interactive session on miss.
//!
//! Both pipelines resolve credentials the same way; they differ only in
//! *when* a freshly acquired credential is committed to the cache. The
//! seal pipeline commits right after the session; the unseal pipeline
//! commits only once the key exchange has succeeded. So `resolve` never
//! writes — the caller calls [`CredentialResolver::commit`] at the point
//! its spec requires.

use std::sync::Arc;

use mailseal_cache::{CacheStore, Credential};
use mailseal_core::Conjunction;
use mailseal_session::{SessionCoordinator, SessionInit};

use crate::error::Result;

/// A resolved credential, with provenance.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub credential: Credential,
    /// True when the credential came from an interactive session rather
    /// than the cache, i.e. it has not been committed yet.
    pub fresh: bool,
}

/// Resolves conjunctions to credentials.
#[derive(Clone)]
pub struct CredentialResolver {
    cache: Arc<dyn CacheStore>,
    coordinator: SessionCoordinator,
}

impl CredentialResolver {
    pub fn new(cache: Arc<dyn CacheStore>, coordinator: SessionCoordinator) -> Self {
        Self { cache, coordinator }
    }

    /// Get a credential for `conjunction`, running a disclosure session
    /// on cache miss. Nothing is written to the cache here; a cancelled
    /// or failed session therefore never leaves a trace.
    pub async fn resolve(
        &self,
        conjunction: &Conjunction,
        init: SessionInit,
        now: i64,
    ) -> Result<Resolved> {
        let hash = conjunction.canonical_hash();

        if let Some(credential) = self.cache.get(&hash, now).await? {
            tracing::debug!(%hash, "credential cache hit");
            return Ok(Resolved {
                credential,
                fresh: false,
            });
        }

        tracing::debug!(%hash, "credential cache miss, opening disclosure session");
        let bearer = self.coordinator.acquire(init).await?;
        let credential = Credential::from_bearer(bearer)?;
        Ok(Resolved {
            credential,
            fresh: true,
        })
    }

    /// Commit a freshly acquired credential to the cache.
    pub async fn commit(&self, conjunction: &Conjunction, credential: &Credential) -> Result<()> {
        let hash = conjunction.canonical_hash();
        self.cache.put(&hash, credential).await?;
        Ok(())
    }
}
