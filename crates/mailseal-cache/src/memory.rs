//! In-memory implementation of the CacheStore trait.
//!
//! Same semantics as SQLite but without persistence. Primarily for
//! tests and fixtures.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use mailseal_core::PolicyHash;

use crate::credential::Credential;
use crate::error::{CacheError, Result};
use crate::traits::CacheStore;

/// In-memory credential cache. All data is lost on drop.
#[derive(Default)]
pub struct MemoryCache {
    inner: RwLock<MemoryCacheInner>,
}

#[derive(Default)]
struct MemoryCacheInner {
    credentials: HashMap<PolicyHash, Credential>,
    master_key: Option<String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.credentials.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, hash: &PolicyHash, now: i64) -> Result<Option<Credential>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        Ok(inner
            .credentials
            .get(hash)
            .filter(|cred| !cred.is_expired(now))
            .cloned())
    }

    async fn put(&self, hash: &PolicyHash, credential: &Credential) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        inner.credentials.insert(*hash, credential.clone());
        Ok(())
    }

    async fn evict_expired(&self, now: i64) -> Result<usize> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        let before = inner.credentials.len();
        inner.credentials.retain(|_, cred| !cred.is_expired(now));
        Ok(before - inner.credentials.len())
    }

    async fn master_key(&self) -> Result<Option<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        Ok(inner.master_key.clone())
    }

    async fn set_master_key(&self, key: &str) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        inner.master_key = Some(key.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailseal_core::{AttributeRequest, Conjunction};

    fn hash_for(addr: &str) -> PolicyHash {
        Conjunction(vec![AttributeRequest::email(addr)]).canonical_hash()
    }

    #[tokio::test]
    async fn test_memory_matches_sqlite_semantics() {
        let cache = MemoryCache::new();
        let hash = hash_for("a@example.com");

        cache.put(&hash, &Credential::new("tok", 100)).await.unwrap();
        assert!(cache.get(&hash, 50).await.unwrap().is_some());
        assert!(cache.get(&hash, 100).await.unwrap().is_none());

        assert_eq!(cache.evict_expired(100).await.unwrap(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.evict_expired(100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_retained_entry_expired_after_evict() {
        let cache = MemoryCache::new();
        for (i, addr) in ["a@x.example", "b@x.example", "c@x.example"]
            .iter()
            .enumerate()
        {
            cache
                .put(&hash_for(addr), &Credential::new(*addr, (i as i64 + 1) * 100))
                .await
                .unwrap();
        }

        cache.evict_expired(150).await.unwrap();

        for addr in ["a@x.example", "b@x.example", "c@x.example"] {
            if let Some(cred) = cache.get(&hash_for(addr), 150).await.unwrap() {
                assert!(cred.expires_at > 150);
            }
        }
        assert_eq!(cache.len(), 2);
    }
}
