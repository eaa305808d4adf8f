//! Scripted classifier

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tierwise_kernel::{
    ComplexityClassifier, ComplexityDistribution, ComplexityLabel, RoutingError, RoutingResult,
};

/// Returns a fixed distribution per prompt.
///
/// Unscripted prompts get `fallback`, which is a confident `simple` unless
/// changed. Calls are counted so tests can check the classifier was skipped.
pub struct ScriptedClassifier {
    script: HashMap<String, ComplexityDistribution>,
    fallback: ComplexityDistribution,
    failure: Mutex<Option<RoutingError>>,
    calls: AtomicUsize,
}

impl Default for ScriptedClassifier {
    fn default() -> Self {
        Self {
            script: HashMap::new(),
            fallback: ComplexityDistribution::from_pairs([(ComplexityLabel::Simple, 1.0)]),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prompt: &str, pairs: &[(ComplexityLabel, f32)]) -> Self {
        self.script.insert(
            prompt.to_string(),
            ComplexityDistribution::from_pairs(pairs.iter().copied()),
        );
        self
    }

    /// Every unscripted prompt classifies as `label` with probability 1.
    pub fn always(mut self, label: ComplexityLabel) -> Self {
        self.fallback = ComplexityDistribution::from_pairs([(label, 1.0)]);
        self
    }

    /// Make every following call fail with `error`.
    pub fn fail_with(&self, error: RoutingError) {
        *self.failure.lock() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComplexityClassifier for ScriptedClassifier {
    fn classify(&self, prompt: &str) -> RoutingResult<ComplexityDistribution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(self.script.get(prompt).copied().unwrap_or(self.fallback))
    }
}
