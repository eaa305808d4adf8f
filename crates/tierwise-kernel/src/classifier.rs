//! Classifier inference contract.
//!
//! Training lives outside this project; all the router needs from a trained
//! model is a probability distribution over [`ComplexityLabel`]s for a prompt.

use crate::error::RoutingResult;
use crate::types::{ClassificationResult, ComplexityDistribution};

/// Default minimum probability for the argmax label to be trusted.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Turns prompt text into a complexity estimate.
///
/// Implementations are CPU-bound and cheap relative to generation, so the
/// contract is synchronous.
pub trait ComplexityClassifier: Send + Sync {
    /// Probability per label.
    ///
    /// # Errors
    /// - `ClassifierNotTrained`: no trained model has been loaded
    fn classify(&self, prompt: &str) -> RoutingResult<ComplexityDistribution>;

    /// Argmax label, or `Uncertain` when its probability is below `threshold`.
    ///
    /// The confidence is always reported, uncertain or not.
    fn classify_with_confidence(
        &self,
        prompt: &str,
        threshold: f32,
    ) -> RoutingResult<ClassificationResult> {
        let dist = self.classify(prompt)?;
        Ok(ClassificationResult::from_distribution(&dist, threshold))
    }

    /// Whether `classify` can be called without `ClassifierNotTrained`.
    fn is_trained(&self) -> bool {
        true
    }
}
