//! CacheStore trait: the abstract interface for credential persistence.
//!
//! This trait keeps the pipelines storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use mailseal_core::PolicyHash;

use crate::credential::Credential;
use crate::error::Result;

/// The CacheStore trait: async interface for credential persistence.
///
/// # Design Notes
///
/// - **Key**: the canonical hash of the conjunction a credential was
///   obtained for. A credential is reusable only for an exactly matching
///   hash.
/// - **Expiry at read time**: `get` treats an entry with
///   `expires_at <= now` as a miss; callers pass the current time so the
///   check stays deterministic under test.
/// - **Last write wins**: `put` overwrites any existing entry for the
///   same hash.
/// - **Master key slot**: a single durable slot holds the last known
///   master public key, the startup fallback when the parameters
///   endpoint is unreachable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an unexpired credential by canonical policy hash.
    async fn get(&self, hash: &PolicyHash, now: i64) -> Result<Option<Credential>>;

    /// Store a credential under a canonical policy hash.
    async fn put(&self, hash: &PolicyHash, credential: &Credential) -> Result<()>;

    /// Remove every entry with `expires_at <= now`. Returns the number
    /// of entries removed. Idempotent; a no-op on an empty store.
    async fn evict_expired(&self, now: i64) -> Result<usize>;

    /// Read the last durably stored master public key.
    async fn master_key(&self) -> Result<Option<String>>;

    /// Replace the stored master public key.
    async fn set_master_key(&self, key: &str) -> Result<()>;
}
