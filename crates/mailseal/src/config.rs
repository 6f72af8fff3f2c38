//! Facade configuration.

use std::time::Duration;

use mailseal_pipeline::{SealConfig, UnsealConfig};

/// Configuration for a MailSeal instance.
#[derive(Debug, Clone)]
pub struct MailSealConfig {
    /// The local account identity decryption matches against. Compose
    /// style (`Name <addr>`) or bare address; canonicalized on use.
    pub local_identity: String,

    /// Whether new compose tabs default to sealing.
    pub default_encrypt: bool,

    /// How often expired cache entries are evicted.
    pub eviction_interval: Duration,

    pub seal: SealConfig,
    pub unseal: UnsealConfig,
}

impl MailSealConfig {
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            default_encrypt: false,
            eviction_interval: Duration::from_secs(600),
            seal: SealConfig::default(),
            unseal: UnsealConfig::default(),
        }
    }
}
