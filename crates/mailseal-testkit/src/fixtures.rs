//! Test fixtures: a fully wired set of collaborators.

use std::sync::Arc;

use mailseal_cache::MemoryCache;
use mailseal_pipeline::{
    CredentialResolver, DecryptSlot, MasterPublicKey, SealConfig, SealPipeline, TabStateRegistry,
    UnsealConfig, UnsealPipeline, VerificationKey,
};
use mailseal_session::{SessionCoordinator, SurfaceProvider};

use crate::engine::{MockEngine, MASTER_PREFIX, VERIFICATION_PREFIX};
use crate::keyservice::MockKeyService;
use crate::mailstore::MemoryMailStore;
use crate::notify::RecordingNotifier;
use crate::surface::GrantingSurface;

/// Seed every fixture's mock key material derives from.
pub const FIXTURE_SEED: &str = "fixture-seed";

/// An expiry far enough out that fixture credentials never age out
/// mid-test (2100-01-01).
pub const FAR_FUTURE: i64 = 4_102_444_800;

/// A fully wired fixture. Every collaborator is shared, so a test can
/// keep its own handle to any of them and inspect state after running a
/// pipeline.
pub struct TestFixture {
    pub cache: Arc<MemoryCache>,
    pub surface: Arc<GrantingSurface>,
    pub provider: Arc<dyn SurfaceProvider>,
    pub key_service: Arc<MockKeyService>,
    pub engine: Arc<MockEngine>,
    pub mail: Arc<MemoryMailStore>,
    pub tabs: Arc<TabStateRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub slot: DecryptSlot,
}

impl TestFixture {
    /// A fixture whose surface grants every disclosure request.
    pub fn new() -> Self {
        let surface = Arc::new(GrantingSurface::new(FAR_FUTURE));
        let provider: Arc<dyn SurfaceProvider> = surface.clone();
        Self::with_provider_and_surface(provider, surface)
    }

    /// A fixture with a custom surface provider (e.g. a scripted
    /// [`mailseal_session::MemorySurface`]). The granting-surface handle
    /// still exists but is not wired in.
    pub fn with_provider(provider: Arc<dyn SurfaceProvider>) -> Self {
        let surface = Arc::new(GrantingSurface::new(FAR_FUTURE));
        Self::with_provider_and_surface(provider, surface)
    }

    fn with_provider_and_surface(
        provider: Arc<dyn SurfaceProvider>,
        surface: Arc<GrantingSurface>,
    ) -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            surface,
            provider,
            key_service: Arc::new(MockKeyService::new(FIXTURE_SEED)),
            engine: Arc::new(MockEngine::new()),
            mail: Arc::new(MemoryMailStore::new()),
            tabs: Arc::new(TabStateRegistry::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            slot: DecryptSlot::new(),
        }
    }

    pub fn coordinator(&self) -> SessionCoordinator {
        SessionCoordinator::new(Arc::clone(&self.provider))
    }

    pub fn resolver(&self) -> CredentialResolver {
        CredentialResolver::new(self.cache.clone(), self.coordinator())
    }

    pub fn seal_pipeline(&self) -> SealPipeline {
        SealPipeline::new(
            self.resolver(),
            self.key_service.clone(),
            self.engine.clone(),
            self.mail.clone(),
            self.tabs.clone(),
            SealConfig::default(),
        )
    }

    pub fn unseal_pipeline(&self) -> UnsealPipeline {
        self.unseal_pipeline_with(UnsealConfig::default())
    }

    pub fn unseal_pipeline_with(&self, config: UnsealConfig) -> UnsealPipeline {
        UnsealPipeline::new(
            self.resolver(),
            self.key_service.clone(),
            self.engine.clone(),
            self.mail.clone(),
            self.slot.clone(),
            config,
        )
    }

    /// The master public key matching the fixture's key service.
    pub fn master_key(&self) -> MasterPublicKey {
        MasterPublicKey(format!("{MASTER_PREFIX}{FIXTURE_SEED}"))
    }

    /// The verification key matching the fixture's key service.
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey(format!("{VERIFICATION_PREFIX}{FIXTURE_SEED}"))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
