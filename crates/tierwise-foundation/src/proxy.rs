//! AdaptiveProxy - classify, route, acquire, generate, record
//!
//! The single entry point for serving a prompt. Classifier failures are
//! returned as errors because there is no safe label to invent; failures to
//! acquire or run a backend come back as an error-shaped
//! [`GenerationResult`] so the caller always has something to render.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{info, warn};

use tierwise_kernel::{
    ClassificationResult, ComplexityClassifier, ComplexityLabel, ModelTier, RouteMode,
    RoutingError, RoutingResult,
};

use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::registry::ModelRegistry;
use crate::routing;

/// How the serving tier was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskComplexity {
    /// Routed on this label, classified or caller-supplied.
    Label(ComplexityLabel),
    /// The caller pinned a tier; no label was involved.
    Override,
    /// The request failed after routing.
    Error,
}

impl TaskComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Label(label) => label.as_str(),
            Self::Override => "override",
            Self::Error => "error",
        }
    }
}

impl Serialize for TaskComplexity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a request produced no text.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureInfo {
    pub error: RoutingError,
}

impl FailureInfo {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

/// Outcome of one [`AdaptiveProxy::adaptive_generate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Generated text, `None` when `error` is set
    pub response: Option<String>,
    /// Tier the request was routed to
    pub tier: ModelTier,
    pub task_complexity: TaskComplexity,
    /// Classifier confidence, only when the classifier ran
    pub confidence: Option<f32>,
    /// Wall-clock time of the generation call alone
    pub generation_time: Duration,
    /// System memory in use right after generation
    pub memory_usage_percent: f32,
    /// Size of the largest tier minus the size of `tier`
    pub memory_saved_bytes: i64,
    pub error: Option<FailureInfo>,
}

impl GenerationResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate view for `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyStats {
    pub loaded_models: Vec<ModelTier>,
    pub memory_usage_percent: f32,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_memory_saved_bytes: i64,
    pub model_usage: BTreeMap<ModelTier, u64>,
}

/// Routes prompts to tiers and serves them.
pub struct AdaptiveProxy {
    classifier: Arc<dyn ComplexityClassifier>,
    registry: ModelRegistry,
    metrics: MetricsAccumulator,
    confidence_threshold: f32,
}

impl AdaptiveProxy {
    /// Build a proxy around a trained classifier.
    ///
    /// # Errors
    /// - `ClassifierNotTrained`: `classifier` has no model loaded
    /// - `Config`: `confidence_threshold` is outside [0, 1]
    pub fn new(
        classifier: Arc<dyn ComplexityClassifier>,
        registry: ModelRegistry,
        confidence_threshold: f32,
    ) -> RoutingResult<Self> {
        if !classifier.is_trained() {
            return Err(RoutingError::ClassifierNotTrained);
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(RoutingError::Config(format!(
                "confidence threshold must be in [0, 1], got {confidence_threshold}"
            )));
        }
        Ok(Self {
            classifier,
            registry,
            metrics: MetricsAccumulator::new(),
            confidence_threshold,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Classify without serving, with the proxy's threshold.
    pub fn classify(&self, prompt: &str) -> RoutingResult<ClassificationResult> {
        self.classifier
            .classify_with_confidence(prompt, self.confidence_threshold)
    }

    /// Serve `prompt`.
    ///
    /// `mode` other than [`RouteMode::Adaptive`] skips the classifier.
    pub async fn adaptive_generate(
        &self,
        prompt: &str,
        mode: RouteMode,
    ) -> RoutingResult<GenerationResult> {
        self.metrics.record_request();

        let (task_complexity, confidence, tier) = match mode {
            RouteMode::Adaptive => {
                let result = self.classify(prompt)?;
                let label = result.resolved_label();
                if result.is_uncertain() {
                    info!(
                        best_guess = %result.best_guess,
                        confidence = result.confidence,
                        "Low-confidence classification, routing as medium"
                    );
                }
                (
                    TaskComplexity::Label(label),
                    Some(result.confidence),
                    routing::tier_for(label),
                )
            }
            RouteMode::Complexity(label) => {
                (TaskComplexity::Label(label), None, routing::tier_for(label))
            }
            RouteMode::Tier(tier) => (TaskComplexity::Override, None, tier),
        };

        let handle = match self.registry.acquire(tier).await {
            Ok(handle) => handle,
            Err(e) if e.is_backend_failure() => return Ok(self.failed(tier, confidence, e)),
            Err(e) => return Err(e),
        };

        let started = Instant::now();
        let generated = handle.generate(prompt).await;
        let generation_time = started.elapsed();
        drop(handle);

        let memory_usage_percent = self.registry.memory_snapshot().used_percent();
        let response = match generated {
            Ok(text) => text,
            Err(e) if e.is_backend_failure() => return Ok(self.failed(tier, confidence, e)),
            Err(e) => return Err(e),
        };

        let memory_saved_bytes = self.registry.tiers().memory_saved(tier)?;
        self.metrics.record(tier, memory_saved_bytes);

        info!(
            tier = %tier,
            complexity = task_complexity.as_str(),
            latency_ms = generation_time.as_millis() as u64,
            memory_usage_percent,
            "Generated response"
        );

        Ok(GenerationResult {
            response: Some(response),
            tier,
            task_complexity,
            confidence,
            generation_time,
            memory_usage_percent,
            memory_saved_bytes,
            error: None,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stats(&self) -> ProxyStats {
        let metrics = self.metrics.snapshot();
        ProxyStats {
            loaded_models: self.registry.loaded_tiers(),
            memory_usage_percent: self.registry.memory_snapshot().used_percent(),
            total_requests: metrics.total_requests,
            failed_requests: metrics.failed_requests,
            total_memory_saved_bytes: metrics.total_memory_saved_bytes,
            model_usage: metrics.per_tier_usage,
        }
    }

    /// Release every loaded tier.
    pub async fn shutdown(&self) {
        info!("Releasing all tiers");
        self.registry.release_all().await;
    }

    fn failed(&self, tier: ModelTier, confidence: Option<f32>, error: RoutingError) -> GenerationResult {
        warn!(tier = %tier, kind = error.kind(), error = %error, "Request failed");
        self.metrics.record_failure();
        GenerationResult {
            response: None,
            tier,
            task_complexity: TaskComplexity::Error,
            confidence,
            generation_time: Duration::ZERO,
            memory_usage_percent: self.registry.memory_snapshot().used_percent(),
            memory_saved_bytes: 0,
            error: Some(FailureInfo { error }),
        }
    }
}
