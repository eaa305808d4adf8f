//! ModelRegistry - per-tier backend cache
//!
//! Owns at most one loaded backend per tier and hands out cloneable
//! [`BackendHandle`]s. Provides:
//! - Lazy loading on first [`ModelRegistry::acquire`], bounded by a timeout
//! - A memory precondition: available memory must exceed 1.5x the tier size
//! - LRU eviction by cache-hit recency, on capacity and on a memory ceiling
//! - Single-flight loads: concurrent acquirers of a loading tier share one load
//!
//! The state mutex only guards the tier map. Loads, unloads and generation
//! all run outside it, so a slow load never stalls hits on other tiers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tierwise_foundation::registry::{ModelRegistry, RegistryConfig};
//!
//! let registry = ModelRegistry::new(
//!     RegistryConfig::default().with_capacity(2),
//!     tiers,
//!     Arc::new(loader),
//!     Arc::new(SystemMemoryProbe::new()),
//! );
//! let handle = registry.acquire(ModelTier::Small).await?;
//! let text = handle.generate("What is the capital of France?").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use tierwise_kernel::{
    BackendLoader, BoxError, GenerationBackend, MemoryProbe, MemorySnapshot, ModelTier,
    RoutingError, RoutingResult, TierSpec, TierTable,
};

/// Multiplier applied to a tier's size for the free-memory precondition.
pub const SAFETY_FACTOR: f64 = 1.5;

/// Bytes that must be available (strictly more than this) to load `size_bytes`.
pub fn required_bytes(size_bytes: u64) -> u64 {
    size_bytes.saturating_add(size_bytes.div_ceil(2))
}

/// Registry tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Maximum number of concurrently loaded tiers
    pub capacity: usize,
    /// Used-memory percentage above which a load first evicts the LRU tier
    pub max_memory_percent: f32,
    /// Upper bound on a single tier load
    pub load_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            max_memory_percent: 90.0,
            load_timeout: Duration::from_secs(300),
        }
    }
}

impl RegistryConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_memory_percent(mut self, percent: f32) -> Self {
        self.max_memory_percent = percent;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn validate(&self) -> RoutingResult<()> {
        if self.capacity == 0 {
            return Err(RoutingError::Config("cache capacity must be at least 1".into()));
        }
        if !(self.max_memory_percent > 0.0 && self.max_memory_percent <= 100.0) {
            return Err(RoutingError::Config(format!(
                "max memory percent must be in (0, 100], got {}",
                self.max_memory_percent
            )));
        }
        if self.load_timeout.is_zero() {
            return Err(RoutingError::Config("load timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Shared reference to one tier's loaded backend.
///
/// Generation through a handle is serialised: backends are not assumed
/// re-entrant.
#[derive(Clone)]
pub struct BackendHandle {
    tier: ModelTier,
    backend: Arc<tokio::sync::Mutex<Box<dyn GenerationBackend>>>,
}

impl BackendHandle {
    pub fn new(tier: ModelTier, backend: Box<dyn GenerationBackend>) -> Self {
        Self {
            tier,
            backend: Arc::new(tokio::sync::Mutex::new(backend)),
        }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub async fn generate(&self, prompt: &str) -> RoutingResult<String> {
        let mut backend = self.backend.lock().await;
        backend
            .generate(prompt)
            .await
            .map_err(|e| RoutingError::GenerationFailed {
                tier: self.tier.to_string(),
                message: e.to_string(),
            })
    }

    /// True when both handles point at the same loaded instance.
    pub fn same_instance(&self, other: &BackendHandle) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }

    pub async fn describe(&self) -> String {
        self.backend.lock().await.describe()
    }

    async fn unload(&self) -> Result<(), BoxError> {
        self.backend.lock().await.unload().await
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

type LoadFuture = Shared<BoxFuture<'static, RoutingResult<BackendHandle>>>;

struct Entry {
    handle: BackendHandle,
    last_hit: u64,
}

#[derive(Default)]
struct RegistryState {
    resident: HashMap<ModelTier, Entry>,
    in_flight: HashMap<ModelTier, LoadFuture>,
    clock: u64,
}

impl RegistryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn hit(&mut self, tier: ModelTier) -> Option<BackendHandle> {
        let now = self.tick();
        self.resident.get_mut(&tier).map(|entry| {
            entry.last_hit = now;
            entry.handle.clone()
        })
    }

    /// Remove the least recently hit tier. Ties go to the lower tier.
    fn pop_lru(&mut self) -> Option<(ModelTier, BackendHandle)> {
        let victim = self
            .resident
            .iter()
            .min_by_key(|(tier, entry)| (entry.last_hit, **tier))
            .map(|(tier, _)| *tier)?;
        self.resident
            .remove(&victim)
            .map(|entry| (victim, entry.handle))
    }
}

struct RegistryInner {
    config: RegistryConfig,
    tiers: TierTable,
    loader: Arc<dyn BackendLoader>,
    probe: Arc<dyn MemoryProbe>,
    state: Mutex<RegistryState>,
}

/// Per-tier backend cache.
///
/// Cheaply cloneable; clones share the same cache.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

impl ModelRegistry {
    pub fn new(
        config: RegistryConfig,
        tiers: TierTable,
        loader: Arc<dyn BackendLoader>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        info!(
            capacity = config.capacity,
            max_memory_percent = config.max_memory_percent,
            load_timeout_secs = config.load_timeout.as_secs(),
            loader = loader.name(),
            "ModelRegistry created"
        );
        Self {
            inner: Arc::new(RegistryInner {
                config,
                tiers,
                loader,
                probe,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Return the loaded backend for `tier`, loading it if needed.
    ///
    /// A resident tier is returned immediately and its recency bumped. A tier
    /// that is already loading is awaited rather than loaded twice. The load
    /// itself runs on its own task, so dropping this future does not cancel
    /// it or leave it half-registered.
    ///
    /// # Errors
    /// - `UnknownTier`: the tier is not configured (checked first)
    /// - `InsufficientMemory`: available memory does not exceed 1.5x its size
    /// - `LoadTimeout`: the load took longer than the configured timeout
    /// - `BackendLoadError`: the loader failed
    pub async fn acquire(&self, tier: ModelTier) -> RoutingResult<BackendHandle> {
        self.inner.tiers.get(tier)?;

        let load = {
            let mut state = self.inner.state.lock();
            if let Some(handle) = state.hit(tier) {
                debug!(tier = %tier, "Tier cache hit");
                return Ok(handle);
            }
            match state.in_flight.get(&tier) {
                Some(load) => {
                    debug!(tier = %tier, "Joining in-flight load");
                    load.clone()
                }
                None => {
                    let registry = self.clone();
                    let task = tokio::spawn(async move { registry.load_and_register(tier).await });
                    let load = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(RoutingError::BackendLoadError {
                                tier: tier.to_string(),
                                message: format!("load task aborted: {e}"),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    state.in_flight.insert(tier, load.clone());
                    load
                }
            }
        };

        load.await
    }

    /// Evict `tier` if loaded. A tier that is not loaded is a no-op.
    pub async fn release_tier(&self, tier: ModelTier) {
        let removed = self.inner.state.lock().resident.remove(&tier);
        if let Some(entry) = removed {
            self.unload(tier, entry.handle, "explicit").await;
        }
    }

    /// Evict every loaded tier.
    pub async fn release_all(&self) {
        let drained: Vec<(ModelTier, Entry)> =
            self.inner.state.lock().resident.drain().collect();
        if drained.is_empty() {
            debug!("release_all: no tiers loaded");
        }
        for (tier, entry) in drained {
            self.unload(tier, entry.handle, "explicit").await;
        }
    }

    /// Loaded tiers in tier order.
    pub fn loaded_tiers(&self) -> Vec<ModelTier> {
        let mut tiers: Vec<ModelTier> = self.inner.state.lock().resident.keys().copied().collect();
        tiers.sort();
        tiers
    }

    /// Loaded tiers from least to most recently hit.
    pub fn lru_order(&self) -> Vec<ModelTier> {
        let state = self.inner.state.lock();
        let mut order: Vec<(u64, ModelTier)> = state
            .resident
            .iter()
            .map(|(tier, entry)| (entry.last_hit, *tier))
            .collect();
        order.sort();
        order.into_iter().map(|(_, tier)| tier).collect()
    }

    pub fn is_loaded(&self, tier: ModelTier) -> bool {
        self.inner.state.lock().resident.contains_key(&tier)
    }

    pub fn is_loading(&self, tier: ModelTier) -> bool {
        self.inner.state.lock().in_flight.contains_key(&tier)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    pub fn tiers(&self) -> &TierTable {
        &self.inner.tiers
    }

    pub fn memory_snapshot(&self) -> MemorySnapshot {
        self.inner.probe.snapshot()
    }

    // Internal methods

    async fn load_and_register(&self, tier: ModelTier) -> RoutingResult<BackendHandle> {
        let result = self.load(tier).await;

        let victims = {
            let mut state = self.inner.state.lock();
            state.in_flight.remove(&tier);
            let Ok(handle) = &result else {
                return result;
            };
            let now = state.tick();
            state.resident.insert(
                tier,
                Entry {
                    handle: handle.clone(),
                    last_hit: now,
                },
            );
            // Concurrent cold loads can all pass the pre-load check on an
            // empty cache. The newest entry holds the latest tick, so it is
            // never its own victim.
            let mut victims = Vec::new();
            while state.resident.len() > self.inner.config.capacity {
                match state.pop_lru() {
                    Some(victim) => victims.push(victim),
                    None => break,
                }
            }
            victims
        };
        for (victim, handle) in victims {
            self.unload(victim, handle, "capacity").await;
        }
        result
    }

    async fn load(&self, tier: ModelTier) -> RoutingResult<BackendHandle> {
        let spec = self.inner.tiers.get(tier)?.clone();

        let snapshot = self.inner.probe.snapshot();
        let required = required_bytes(spec.size_bytes);
        if snapshot.available_bytes <= required {
            let shortfall = required - snapshot.available_bytes + 1;
            warn!(
                tier = %tier,
                required_bytes = required,
                available_bytes = snapshot.available_bytes,
                shortfall_bytes = shortfall,
                "Insufficient memory to load tier"
            );
            return Err(RoutingError::InsufficientMemory {
                tier: tier.to_string(),
                required_bytes: required,
                available_bytes: snapshot.available_bytes,
                shortfall_bytes: shortfall,
            });
        }

        self.evict_for_capacity(tier).await;
        self.evict_for_memory_ceiling().await;

        let timeout = self.inner.config.load_timeout;
        let started = Instant::now();
        info!(tier = %tier, locator = %spec.locator, "Loading tier");

        match tokio::time::timeout(timeout, self.inner.loader.load(tier, &spec)).await {
            Ok(Ok(backend)) => {
                info!(
                    tier = %tier,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    backend = %backend.describe(),
                    "Tier loaded"
                );
                Ok(BackendHandle::new(tier, backend))
            }
            Ok(Err(e)) => {
                error!(tier = %tier, error = %e, "Tier load failed");
                self.abort(tier, &spec).await;
                Err(RoutingError::BackendLoadError {
                    tier: tier.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(tier = %tier, timeout_secs = timeout.as_secs_f64(), "Tier load timed out");
                self.abort(tier, &spec).await;
                Err(RoutingError::LoadTimeout {
                    tier: tier.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn abort(&self, tier: ModelTier, spec: &TierSpec) {
        if let Err(e) = self.inner.loader.abort(tier, spec).await {
            warn!(tier = %tier, error = %e, "Cleanup after failed load failed");
        }
    }

    /// Make room so that resident tiers plus other in-flight loads stay below
    /// capacity once `loading` lands.
    async fn evict_for_capacity(&self, loading: ModelTier) {
        let victims = {
            let mut state = self.inner.state.lock();
            let others_loading = state.in_flight.keys().filter(|t| **t != loading).count();
            let mut victims = Vec::new();
            while state.resident.len() + others_loading >= self.inner.config.capacity {
                match state.pop_lru() {
                    Some(victim) => victims.push(victim),
                    None => break,
                }
            }
            victims
        };
        for (tier, handle) in victims {
            self.unload(tier, handle, "capacity").await;
        }
    }

    async fn evict_for_memory_ceiling(&self) {
        let used = self.inner.probe.snapshot().used_percent();
        if used <= self.inner.config.max_memory_percent {
            return;
        }
        let victim = self.inner.state.lock().pop_lru();
        match victim {
            Some((tier, handle)) => {
                debug!(used_percent = used, "Memory ceiling exceeded");
                self.unload(tier, handle, "memory_ceiling").await;
            }
            None => debug!(used_percent = used, "Memory ceiling exceeded, nothing to evict"),
        }
    }

    async fn unload(&self, tier: ModelTier, handle: BackendHandle, reason: &'static str) {
        info!(tier = %tier, reason, "Evicting tier");
        if let Err(e) = handle.unload().await {
            warn!(tier = %tier, error = %e, "Backend unload failed");
        }
    }
}
