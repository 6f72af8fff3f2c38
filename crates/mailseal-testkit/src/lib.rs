//! # MailSeal Testkit
//!
//! Working test doubles for every external collaborator, wired together
//! by [`TestFixture`].
//!
//! The mock engine seals into the production container format with real
//! AEAD under mock-derived keys, and the mock key service derives the
//! matching keys from bearer claims — so round-trip, wrong-key, and
//! sender-verification tests exercise the genuine pipeline paths.

pub mod engine;
pub mod fixtures;
pub mod generators;
pub mod keyservice;
pub mod mailstore;
pub mod notify;
pub mod surface;
pub mod token;

pub use engine::{mock_decryption_key, seal_container, MockEngine, MASTER_PREFIX, VERIFICATION_PREFIX};
pub use fixtures::{TestFixture, FAR_FUTURE, FIXTURE_SEED};
pub use keyservice::MockKeyService;
pub use mailstore::{MemoryMailStore, StoredMessage};
pub use notify::RecordingNotifier;
pub use surface::GrantingSurface;
pub use token::{decode_bearer, mint_bearer};
