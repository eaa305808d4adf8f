//! Simulated backend
//!
//! Loads and generates in-process after configurable delays. Output is
//! deterministic, so routing can be exercised end to end without a model
//! server. Load, unload and generation counts are kept for inspection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use tierwise_kernel::{BackendLoader, BoxError, GenerationBackend, ModelTier, TierSpec};

/// Delays for the simulated backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub load_delay_ms: u64,
    pub generate_delay_ms: u64,
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    unloads: AtomicUsize,
    aborts: AtomicUsize,
    generations: AtomicUsize,
}

/// In-process loader with canned output.
#[derive(Debug, Default)]
pub struct SimulatedLoader {
    load_delay: Duration,
    generate_delay: Duration,
    load_failures: Mutex<HashMap<ModelTier, String>>,
    generate_failures: Arc<Mutex<HashMap<ModelTier, String>>>,
    counters: Arc<Counters>,
    next_instance: AtomicU64,
}

impl SimulatedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SimulatedConfig) -> Self {
        Self::new()
            .with_load_delay(Duration::from_millis(config.load_delay_ms))
            .with_generate_delay(Duration::from_millis(config.generate_delay_ms))
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    /// Make every future load of `tier` fail with `message`.
    pub fn fail_tier(&self, tier: ModelTier, message: impl Into<String>) {
        self.load_failures.lock().insert(tier, message.into());
    }

    /// Make generation on `tier` fail with `message`, including on backends
    /// that are already loaded.
    pub fn fail_generation(&self, tier: ModelTier, message: impl Into<String>) {
        self.generate_failures.lock().insert(tier, message.into());
    }

    /// Load attempts started, including ones that timed out or failed.
    pub fn loads(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.counters.unloads.load(Ordering::SeqCst)
    }

    /// Failed or timed-out loads the registry cleaned up after.
    pub fn aborts(&self) -> usize {
        self.counters.aborts.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.counters.generations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendLoader for SimulatedLoader {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn load(
        &self,
        tier: ModelTier,
        spec: &TierSpec,
    ) -> Result<Box<dyn GenerationBackend>, BoxError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(message) = self.load_failures.lock().get(&tier) {
            return Err(message.clone().into());
        }

        Ok(Box::new(SimulatedBackend {
            tier,
            locator: spec.locator.clone(),
            instance: self.next_instance.fetch_add(1, Ordering::SeqCst),
            generate_delay: self.generate_delay,
            generate_failures: self.generate_failures.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn abort(&self, _tier: ModelTier, _spec: &TierSpec) -> Result<(), BoxError> {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A simulated loaded model.
#[derive(Debug)]
pub struct SimulatedBackend {
    tier: ModelTier,
    locator: String,
    instance: u64,
    generate_delay: Duration,
    generate_failures: Arc<Mutex<HashMap<ModelTier, String>>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    async fn generate(&mut self, prompt: &str) -> Result<String, BoxError> {
        if !self.generate_delay.is_zero() {
            tokio::time::sleep(self.generate_delay).await;
        }
        if let Some(message) = self.generate_failures.lock().get(&self.tier) {
            return Err(message.clone().into());
        }
        self.counters.generations.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[{} via {}] {}", self.tier, self.locator, prompt))
    }

    async fn unload(&mut self) -> Result<(), BoxError> {
        self.counters.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated:{}#{}", self.locator, self.instance)
    }
}
