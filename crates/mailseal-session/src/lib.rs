//! # MailSeal Session
//!
//! Interactive disclosure sessions: how a fresh credential is obtained
//! when the cache misses.
//!
//! ## Contract
//!
//! Exactly one surface opens per logical request and exactly two
//! messages are exchanged: **init** (coordinator -> surface, carrying
//! the target conjunction, kind, and display hints) and **done**
//! (surface -> coordinator, carrying the credential or an abandonment
//! signal). Closing the surface before done fails the pending request
//! with [`SessionError::Cancelled`]. The returned credential is opaque;
//! only its self-declared expiry is ever inspected, and only for cache
//! bookkeeping.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod messages;

pub use coordinator::{SessionCoordinator, SurfaceProvider, SurfaceSession};
pub use error::{Result, SessionError};
pub use memory::{MemorySurface, Scripted};
pub use messages::{DisclosureKind, SessionInit, SessionOutcome};
