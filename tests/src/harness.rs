//! Proxy harness over the simulated backend

use std::sync::Arc;

use axum::Router;
use tierwise_foundation::backend::SimulatedLoader;
use tierwise_foundation::{AdaptiveProxy, ModelRegistry, RegistryConfig, StaticMemoryProbe};
use tierwise_gateway::{AppState, build_router};
use tierwise_kernel::{ComplexityClassifier, ModelTier, TierSpec, TierTable};

pub const GB: u64 = 1 << 30;

/// The default four tiers with their default sizes.
pub fn tier_table() -> TierTable {
    TierTable::new()
        .with_tier(ModelTier::Tiny, TierSpec::new("tiny-model", 5 * GB))
        .with_tier(ModelTier::Small, TierSpec::new("small-model", 16 * GB))
        .with_tier(ModelTier::Mid, TierSpec::new("mid-model", 40 * GB))
        .with_tier(ModelTier::Large, TierSpec::new("large-model", 75 * GB))
}

/// A proxy wired to a [`SimulatedLoader`] and a [`StaticMemoryProbe`].
///
/// The probe starts with 512 GB total and 400 GB available, enough for
/// every tier.
pub struct ProxyHarness {
    pub proxy: Arc<AdaptiveProxy>,
    pub loader: Arc<SimulatedLoader>,
    pub probe: Arc<StaticMemoryProbe>,
}

impl ProxyHarness {
    pub fn new(classifier: Arc<dyn ComplexityClassifier>) -> Self {
        Self::with_config(classifier, RegistryConfig::default())
    }

    pub fn with_config(classifier: Arc<dyn ComplexityClassifier>, config: RegistryConfig) -> Self {
        Self::with_loader(classifier, config, SimulatedLoader::new())
    }

    pub fn with_loader(
        classifier: Arc<dyn ComplexityClassifier>,
        config: RegistryConfig,
        loader: SimulatedLoader,
    ) -> Self {
        let loader = Arc::new(loader);
        let probe = Arc::new(StaticMemoryProbe::new(512 * GB, 400 * GB));
        let registry = ModelRegistry::new(config, tier_table(), loader.clone(), probe.clone());
        let proxy = AdaptiveProxy::new(classifier, registry, 0.6).expect("trained classifier");
        Self {
            proxy: Arc::new(proxy),
            loader,
            probe,
        }
    }

    /// The HTTP router over this proxy.
    pub fn router(&self, api_key: Option<&str>) -> Router {
        build_router(Arc::new(AppState::new(
            self.proxy.clone(),
            api_key.map(str::to_string),
        )))
    }
}
