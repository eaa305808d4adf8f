//! `tierwise-foundation` - the adaptive routing engine.
//!
//! - [`classifier`]: TF-IDF + linear [`TaskClassifier`] over a JSON artifact
//! - [`routing`]: fixed label-to-tier policy
//! - [`registry`]: [`ModelRegistry`], the per-tier backend cache
//! - [`proxy`]: [`AdaptiveProxy`], classify → route → acquire → generate
//! - [`metrics`]: request counters
//! - [`hardware`]: memory probes
//! - [`backend`]: Ollama and simulated loaders
//! - [`config`]: serde configuration sections and proxy wiring

pub mod backend;
pub mod classifier;
pub mod config;
pub mod hardware;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod routing;

pub use classifier::TaskClassifier;
pub use config::ProxyConfig;
pub use hardware::{StaticMemoryProbe, SystemMemoryProbe};
pub use metrics::{MetricsAccumulator, MetricsSnapshot};
pub use proxy::{AdaptiveProxy, FailureInfo, GenerationResult, ProxyStats, TaskComplexity};
pub use registry::{BackendHandle, ModelRegistry, RegistryConfig};
pub use routing::select_model;
