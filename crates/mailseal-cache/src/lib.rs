//! # MailSeal Cache
//!
//! Durable credential cache. Provides a trait-based interface for
//! storing disclosure-session credentials keyed by canonical policy
//! hash, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`CacheStore`] - the async trait for all cache operations
//! - [`SqliteCache`] - SQLite-based persistent cache
//! - [`MemoryCache`] - in-memory cache for tests
//! - [`Credential`] - a bearer token with its self-declared expiry
//!
//! ## Trust boundary
//!
//! The cache trusts each credential's self-declared expiry claim, with
//! no signature verification, and uses it only to decide when an entry
//! stops being served. The key service revalidates every credential it
//! receives, so this trust affects cache behavior only, never access
//! decisions.

pub mod credential;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use credential::Credential;
pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::CacheStore;
