//! Proxy configuration
//!
//! Serde sections shared by every entry point, plus [`ProxyConfig::build`],
//! which turns a validated configuration into a running [`AdaptiveProxy`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use tierwise_kernel::error::{KernelError, KernelResult};
use tierwise_kernel::{
    BackendLoader, ComplexityClassifier, DEFAULT_CONFIDENCE_THRESHOLD, MemoryProbe, ModelTier,
    RoutingError, RoutingResult, TierSpec, TierTable,
};

use crate::backend::{OllamaConfig, OllamaLoader, SimulatedConfig, SimulatedLoader};
use crate::classifier::TaskClassifier;
use crate::hardware::SystemMemoryProbe;
use crate::proxy::AdaptiveProxy;
use crate::registry::{ModelRegistry, RegistryConfig};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Classifier artifact (JSON)
    pub path: PathBuf,
    pub confidence_threshold: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/task_classifier.json"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub max_memory_percent: f32,
    pub cache_capacity: usize,
    pub load_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        let defaults = RegistryConfig::default();
        Self {
            max_memory_percent: defaults.max_memory_percent,
            cache_capacity: defaults.capacity,
            load_timeout_secs: defaults.load_timeout.as_secs(),
        }
    }
}

impl RegistrySettings {
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig::default()
            .with_capacity(self.cache_capacity)
            .with_max_memory_percent(self.max_memory_percent)
            .with_load_timeout(Duration::from_secs(self.load_timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Ollama,
    Simulated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub ollama: OllamaConfig,
    pub simulated: SimulatedConfig,
}

impl BackendSettings {
    pub fn build_loader(&self) -> KernelResult<Arc<dyn BackendLoader>> {
        let loader: Arc<dyn BackendLoader> = match self.kind {
            BackendKind::Ollama => Arc::new(
                OllamaLoader::new(self.ollama.clone())
                    .map_err(|e| Report::new(KernelError::Internal(e.to_string())))
                    .attach("building the Ollama HTTP client")?,
            ),
            BackendKind::Simulated => Arc::new(SimulatedLoader::from_config(&self.simulated)),
        };
        Ok(loader)
    }
}

/// One tier as written in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSettings {
    pub locator: String,
    pub size_gb: f64,
}

impl TierSettings {
    fn new(locator: &str, size_gb: f64) -> Self {
        Self {
            locator: locator.to_string(),
            size_gb,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        (self.size_gb * BYTES_PER_GB) as u64
    }
}

/// The default deployment: one Llama 3 8B and one 70B, each at two
/// quantizations.
pub fn default_tiers() -> BTreeMap<ModelTier, TierSettings> {
    BTreeMap::from([
        (ModelTier::Tiny, TierSettings::new("llama3:8b-instruct-q4_0", 5.0)),
        (ModelTier::Small, TierSettings::new("llama3:8b-instruct-fp16", 16.0)),
        (ModelTier::Mid, TierSettings::new("llama3.1:70b-instruct-q4_0", 40.0)),
        (ModelTier::Large, TierSettings::new("llama3.1:70b-instruct-q8_0", 75.0)),
    ])
}

/// Everything needed to build an [`AdaptiveProxy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub classifier: ClassifierSettings,
    pub registry: RegistrySettings,
    pub backend: BackendSettings,
    pub tiers: BTreeMap<ModelTier, TierSettings>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            registry: RegistrySettings::default(),
            backend: BackendSettings::default(),
            tiers: default_tiers(),
        }
    }
}

impl ProxyConfig {
    /// Reject values outside their documented units.
    pub fn validate(&self) -> RoutingResult<()> {
        let threshold = self.classifier.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RoutingError::Config(format!(
                "classifier.confidence_threshold must be in [0, 1], got {threshold}"
            )));
        }
        self.registry.to_registry_config().validate()?;

        if let Some(tier) = ModelTier::ALL.into_iter().find(|t| !self.tiers.contains_key(t)) {
            return Err(RoutingError::Config(format!(
                "tiers.{tier} is missing; every tier must be configured"
            )));
        }
        for (tier, settings) in &self.tiers {
            if settings.locator.trim().is_empty() {
                return Err(RoutingError::Config(format!("tiers.{tier}.locator is empty")));
            }
            if !(settings.size_gb.is_finite() && settings.size_gb > 0.0) {
                return Err(RoutingError::Config(format!(
                    "tiers.{tier}.size_gb must be positive, got {}",
                    settings.size_gb
                )));
            }
        }

        let table = self.tier_table();
        let Some((largest, spec)) = table.largest() else {
            return Ok(());
        };
        match table.iter().find(|(_, s)| s.size_bytes > spec.size_bytes) {
            Some((tier, _)) => Err(RoutingError::Config(format!(
                "tier '{tier}' is bigger than the largest tier '{largest}'"
            ))),
            None => Ok(()),
        }
    }

    pub fn tier_table(&self) -> TierTable {
        self.tiers
            .iter()
            .fold(TierTable::new(), |table, (tier, settings)| {
                table.with_tier(*tier, TierSpec::new(settings.locator.clone(), settings.size_bytes()))
            })
    }

    /// Validate, load the classifier and wire a proxy over live system memory.
    pub fn build(&self) -> KernelResult<AdaptiveProxy> {
        let classifier = TaskClassifier::from_path(&self.classifier.path)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!(
                "loading classifier from {}",
                self.classifier.path.display()
            ))?;
        self.build_with(
            Arc::new(classifier),
            self.backend.build_loader()?,
            Arc::new(SystemMemoryProbe::new()),
        )
    }

    /// Validate and wire a proxy from explicit parts.
    pub fn build_with(
        &self,
        classifier: Arc<dyn ComplexityClassifier>,
        loader: Arc<dyn BackendLoader>,
        probe: Arc<dyn MemoryProbe>,
    ) -> KernelResult<AdaptiveProxy> {
        self.validate()
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach("validating configuration")?;

        let registry = ModelRegistry::new(
            self.registry.to_registry_config(),
            self.tier_table(),
            loader,
            probe,
        );
        let proxy = AdaptiveProxy::new(classifier, registry, self.classifier.confidence_threshold)
            .map_err(KernelError::from)
            .map_err(Report::new)?;

        info!(
            tiers = self.tiers.len(),
            backend = ?self.backend.kind,
            threshold = self.classifier.confidence_threshold,
            "Adaptive proxy ready"
        );
        Ok(proxy)
    }
}
