//! `tierwise-kernel` - contracts for complexity-based model routing.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`types`] | Labels, tiers, tier table, distributions, route modes |
//! | [`classifier`] | [`ComplexityClassifier`] inference contract |
//! | [`backend`] | [`BackendLoader`] / [`GenerationBackend`] plug-in traits |
//! | [`memory`] | [`MemoryProbe`] and [`MemorySnapshot`] |
//! | [`error`] | [`RoutingError`] taxonomy, [`KernelError`] startup errors |
//! | [`config`] | Multi-format config loading with env overrides |

pub mod backend;
pub mod classifier;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use backend::{BackendLoader, BoxError, GenerationBackend};
pub use classifier::{ComplexityClassifier, DEFAULT_CONFIDENCE_THRESHOLD};
pub use error::{KernelError, KernelResult, RoutingError, RoutingResult};
pub use memory::{MemoryProbe, MemorySnapshot};
pub use types::{
    Classification, ClassificationResult, ComplexityDistribution, ComplexityLabel, ModelTier,
    RouteMode, TierSpec, TierTable,
};
