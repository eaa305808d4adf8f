//! TaskClassifier - TF-IDF + linear model complexity classifier
//!
//! Consumes a classifier artifact produced by an external training pipeline
//! and runs inference only. Two artifact schemas are recognised by structure:
//!
//! - **Current** (JSON object): explicit `labels`, a TF-IDF `vectorizer`,
//!   optional named structural `features` placed before the TF-IDF block, an
//!   optional standard `scaler`, and the linear `model`.
//! - **Legacy** (two-element JSON array `[vectorizer, model]`): labels are the
//!   four canonical labels in order, and the feature vector is the TF-IDF block
//!   followed by the prompt's character length.
//!
//! Legacy artifacts are upgraded in memory on load, so [`TaskClassifier::save_model`]
//! always writes the current schema.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tierwise_kernel::error::{KernelError, KernelResult, RoutingError, RoutingResult};
use tierwise_kernel::{ComplexityClassifier, ComplexityDistribution, ComplexityLabel};

/// TF-IDF vectorizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerArtifact {
    /// Term (or space-joined n-gram) to column index.
    pub vocabulary: BTreeMap<String, usize>,
    /// Inverse document frequency per column.
    pub idf: Vec<f32>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
}

/// Longest n-gram an artifact may ask for.
pub const MAX_NGRAM: usize = 8;

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_lowercase() -> bool {
    true
}

/// Multinomial linear model: one coefficient row and one intercept per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelArtifact {
    pub coefficients: Vec<Vec<f32>>,
    pub intercepts: Vec<f32>,
}

/// Standardisation applied to the full feature vector before the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

/// Structural prompt features that can precede the TF-IDF block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralFeature {
    WordCount,
    CharCount,
    AvgWordLength,
    SentenceCount,
    AvgSentenceLength,
    UniqueWordRatio,
}

impl StructuralFeature {
    fn extract(self, prompt: &str) -> f32 {
        let words: Vec<&str> = prompt.split_whitespace().collect();
        let word_count = words.len() as f32;
        match self {
            Self::WordCount => word_count,
            Self::CharCount => prompt.chars().count() as f32,
            Self::AvgWordLength => {
                if words.is_empty() {
                    0.0
                } else {
                    words.iter().map(|w| w.chars().count()).sum::<usize>() as f32 / word_count
                }
            }
            Self::SentenceCount => sentence_count(prompt) as f32,
            Self::AvgSentenceLength => match sentence_count(prompt) {
                0 => 0.0,
                n => word_count / n as f32,
            },
            Self::UniqueWordRatio => {
                if words.is_empty() {
                    0.0
                } else {
                    let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
                    unique.len() as f32 / word_count
                }
            }
        }
    }
}

fn sentence_count(prompt: &str) -> usize {
    prompt
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Current artifact schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentArtifact {
    pub labels: Vec<ComplexityLabel>,
    pub vectorizer: VectorizerArtifact,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<StructuralFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<ScalerArtifact>,
    pub model: LinearModelArtifact,
}

/// Legacy artifact schema: `[vectorizer, model]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyArtifact(pub VectorizerArtifact, pub LinearModelArtifact);

/// Any recognised artifact, detected by structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassifierArtifact {
    Current(CurrentArtifact),
    Legacy(LegacyArtifact),
}

impl ClassifierArtifact {
    /// Normalise to the current schema.
    ///
    /// The legacy trailing character-length column becomes a leading
    /// `char_count` feature, so every coefficient row is rotated by one.
    pub fn into_current(self) -> RoutingResult<CurrentArtifact> {
        match self {
            Self::Current(current) => Ok(current),
            Self::Legacy(LegacyArtifact(vectorizer, mut model)) => {
                let expected = vectorizer.idf.len() + 1;
                for (row, coefficients) in model.coefficients.iter_mut().enumerate() {
                    if coefficients.len() != expected {
                        return Err(RoutingError::ClassifierFormatError(format!(
                            "legacy coefficient row {row} has {} columns, expected {expected}",
                            coefficients.len()
                        )));
                    }
                    coefficients.rotate_right(1);
                }
                Ok(CurrentArtifact {
                    labels: ComplexityLabel::ALL.to_vec(),
                    vectorizer,
                    features: vec![StructuralFeature::CharCount],
                    scaler: None,
                    model,
                })
            }
        }
    }
}

impl CurrentArtifact {
    fn feature_width(&self) -> usize {
        self.features.len() + self.vectorizer.idf.len()
    }

    fn validate(&self) -> RoutingResult<()> {
        let fail = |msg: String| Err(RoutingError::ClassifierFormatError(msg));

        if self.labels.is_empty() {
            return fail("artifact declares no labels".to_string());
        }
        let unique: HashSet<_> = self.labels.iter().collect();
        if unique.len() != self.labels.len() {
            return fail("artifact declares duplicate labels".to_string());
        }

        let (min_n, max_n) = self.vectorizer.ngram_range;
        if min_n == 0 || min_n > max_n || max_n > MAX_NGRAM {
            return fail(format!("invalid ngram_range ({min_n}, {max_n})"));
        }
        let columns = self.vectorizer.idf.len();
        if let Some((term, idx)) = self.vectorizer.vocabulary.iter().find(|(_, i)| **i >= columns) {
            return fail(format!("vocabulary term '{term}' maps to column {idx} of {columns}"));
        }

        let width = self.feature_width();
        let model = &self.model;
        if model.coefficients.len() != self.labels.len() || model.intercepts.len() != self.labels.len() {
            return fail(format!(
                "model has {} coefficient rows and {} intercepts for {} labels",
                model.coefficients.len(),
                model.intercepts.len(),
                self.labels.len()
            ));
        }
        if let Some((row, c)) = model.coefficients.iter().enumerate().find(|(_, c)| c.len() != width) {
            return fail(format!("coefficient row {row} has {} columns, expected {width}", c.len()));
        }
        match &self.scaler {
            Some(s) if s.mean.len() != width || s.scale.len() != width => {
                fail(format!("scaler width does not match feature width {width}"))
            }
            _ => Ok(()),
        }
    }
}

/// Inference-only complexity classifier.
#[derive(Debug, Clone, Default)]
pub struct TaskClassifier {
    artifact: Option<CurrentArtifact>,
}

impl TaskClassifier {
    /// An untrained classifier. `classify` fails until a model is loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a classifier from an artifact file.
    pub fn from_path(path: impl AsRef<Path>) -> RoutingResult<Self> {
        let mut classifier = Self::new();
        classifier.load_model(path)?;
        Ok(classifier)
    }

    pub fn from_artifact(artifact: ClassifierArtifact) -> RoutingResult<Self> {
        let current = artifact.into_current()?;
        current.validate()?;
        Ok(Self {
            artifact: Some(current),
        })
    }

    /// Replace the loaded model with the artifact at `path`.
    ///
    /// # Errors
    /// - `ClassifierFileNotFound`: `path` does not exist
    /// - `ClassifierFormatError`: the file matches no recognised schema or
    ///   has inconsistent dimensions
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> RoutingResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RoutingError::ClassifierFileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RoutingError::ClassifierFormatError(e.to_string()))?;
        let artifact: ClassifierArtifact = serde_json::from_str(&raw).map_err(|e| {
            RoutingError::ClassifierFormatError(format!("unrecognised artifact schema: {e}"))
        })?;

        let legacy = matches!(artifact, ClassifierArtifact::Legacy(_));
        *self = Self::from_artifact(artifact)?;

        info!(
            path = %path.display(),
            legacy,
            labels = self.labels().len(),
            "Loaded classifier artifact"
        );
        Ok(())
    }

    /// Write the loaded model in the current schema.
    pub fn save_model(&self, path: impl AsRef<Path>) -> KernelResult<()> {
        let path = path.as_ref();
        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| Report::new(KernelError::Routing(RoutingError::ClassifierNotTrained)))?;
        let json = serde_json::to_string_pretty(artifact)
            .map_err(KernelError::from)
            .map_err(Report::new)?;
        std::fs::write(path, json)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!("writing classifier artifact to {}", path.display()))?;
        Ok(())
    }

    /// Labels the loaded model can emit, in artifact order.
    pub fn labels(&self) -> &[ComplexityLabel] {
        self.artifact.as_ref().map(|a| a.labels.as_slice()).unwrap_or(&[])
    }

    fn tokens(vectorizer: &VectorizerArtifact, prompt: &str) -> Vec<String> {
        let text = if vectorizer.lowercase {
            prompt.to_lowercase()
        } else {
            prompt.to_string()
        };
        // Word-character runs of at least two characters.
        text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| w.chars().count() >= 2)
            .map(str::to_string)
            .collect()
    }

    fn tfidf(vectorizer: &VectorizerArtifact, prompt: &str) -> Vec<f32> {
        let tokens = Self::tokens(vectorizer, prompt);
        let (min_n, max_n) = vectorizer.ngram_range;

        let mut counts: HashMap<usize, f32> = HashMap::new();
        for n in min_n..=max_n.min(tokens.len()) {
            for window in tokens.windows(n) {
                if let Some(&col) = vectorizer.vocabulary.get(&window.join(" ")) {
                    *counts.entry(col).or_default() += 1.0;
                }
            }
        }

        let mut row = vec![0.0f32; vectorizer.idf.len()];
        for (col, tf) in counts {
            let tf = if vectorizer.sublinear_tf { 1.0 + tf.ln() } else { tf };
            row[col] = tf * vectorizer.idf[col];
        }

        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        row
    }

    fn features(artifact: &CurrentArtifact, prompt: &str) -> Vec<f32> {
        let mut x: Vec<f32> = artifact.features.iter().map(|f| f.extract(prompt)).collect();
        x.extend(Self::tfidf(&artifact.vectorizer, prompt));

        if let Some(scaler) = &artifact.scaler {
            for ((v, mean), scale) in x.iter_mut().zip(&scaler.mean).zip(&scaler.scale) {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                *v = (*v - mean) / scale;
            }
        }
        x
    }
}

impl ComplexityClassifier for TaskClassifier {
    fn classify(&self, prompt: &str) -> RoutingResult<ComplexityDistribution> {
        let artifact = self
            .artifact
            .as_ref()
            .ok_or(RoutingError::ClassifierNotTrained)?;
        let x = Self::features(artifact, prompt);

        let logits: Vec<f64> = artifact
            .model
            .coefficients
            .iter()
            .zip(&artifact.model.intercepts)
            .map(|(row, b)| {
                row.iter().zip(&x).map(|(w, v)| (*w as f64) * (*v as f64)).sum::<f64>() + *b as f64
            })
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        let dist = ComplexityDistribution::from_pairs(
            artifact
                .labels
                .iter()
                .zip(&exps)
                .map(|(label, e)| (*label, (e / total) as f32)),
        );
        debug!(?dist, "Classified prompt");
        Ok(dist)
    }

    fn is_trained(&self) -> bool {
        self.artifact.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierwise_kernel::{Classification, DEFAULT_CONFIDENCE_THRESHOLD};

    fn vectorizer() -> VectorizerArtifact {
        VectorizerArtifact {
            vocabulary: [("capital", 0), ("france", 1), ("prove", 2), ("theorem", 3)]
                .into_iter()
                .map(|(t, i)| (t.to_string(), i))
                .collect(),
            idf: vec![1.0; 4],
            ngram_range: (1, 1),
            sublinear_tf: false,
            lowercase: true,
        }
    }

    fn current() -> CurrentArtifact {
        CurrentArtifact {
            labels: ComplexityLabel::ALL.to_vec(),
            vectorizer: vectorizer(),
            features: vec![],
            scaler: None,
            model: LinearModelArtifact {
                coefficients: vec![
                    vec![0.0, 0.0, 0.0, 0.0],
                    vec![5.0, 5.0, 0.0, 0.0],
                    vec![0.0, 0.0, 0.0, 0.0],
                    vec![0.0, 0.0, 5.0, 5.0],
                ],
                intercepts: vec![0.0; 4],
            },
        }
    }

    fn legacy_json() -> String {
        // Trailing column weighs the prompt's character length.
        serde_json::json!([
            vectorizer(),
            {
                "coefficients": [
                    [0.0, 0.0, 0.0, 0.0, 0.0],
                    [5.0, 5.0, 0.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0, 0.0, 0.1]
                ],
                "intercepts": [0.0, 0.0, 0.0, 0.0]
            }
        ])
        .to_string()
    }

    #[test]
    fn test_untrained_classifier_refuses() {
        let c = TaskClassifier::new();
        assert!(!c.is_trained());
        assert_eq!(
            c.classify("anything").unwrap_err(),
            RoutingError::ClassifierNotTrained
        );
    }

    #[test]
    fn test_simple_prompt_is_confident() {
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(current())).unwrap();
        let result = c
            .classify_with_confidence("What is the capital of France?", DEFAULT_CONFIDENCE_THRESHOLD)
            .unwrap();
        assert_eq!(
            result.classification,
            Classification::Confident(ComplexityLabel::Simple)
        );
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(current())).unwrap();
        let dist = c.classify("Prove the theorem").unwrap();
        let total: f32 = dist.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert_eq!(dist.argmax().0, ComplexityLabel::Complex);
    }

    #[test]
    fn test_no_known_terms_is_uniform_and_uncertain() {
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(current())).unwrap();
        let result = c.classify_with_confidence("hello there", 0.6).unwrap();
        assert!(result.is_uncertain());
        assert!((result.confidence - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_label_subset_in_any_order() {
        let mut a = current();
        a.labels = vec![ComplexityLabel::Complex, ComplexityLabel::Simple];
        a.model.coefficients = vec![vec![0.0, 0.0, 5.0, 5.0], vec![5.0, 5.0, 0.0, 0.0]];
        a.model.intercepts = vec![0.0, 0.0];
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap();

        let dist = c.classify("capital of france").unwrap();
        assert_eq!(dist.argmax().0, ComplexityLabel::Simple);
        assert_eq!(dist.get(ComplexityLabel::Medium), 0.0);
    }

    #[test]
    fn test_structural_features_and_scaler() {
        let mut a = current();
        a.features = vec![StructuralFeature::WordCount];
        a.scaler = Some(ScalerArtifact {
            mean: vec![10.0, 0.0, 0.0, 0.0, 0.0],
            scale: vec![2.0, 1.0, 1.0, 1.0, 1.0],
        });
        // Only the medium row looks at (word_count - 10) / 2.
        a.model.coefficients = vec![
            vec![0.0; 5],
            vec![0.0; 5],
            vec![3.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0; 5],
        ];
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap();

        let long = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen";
        assert_eq!(c.classify(long).unwrap().argmax().0, ComplexityLabel::Medium);
        assert_ne!(c.classify("short").unwrap().argmax().0, ComplexityLabel::Medium);
    }

    #[test]
    fn test_structural_feature_values() {
        let text = "Hello world. Hello again!";
        assert_eq!(StructuralFeature::WordCount.extract(text), 4.0);
        assert_eq!(StructuralFeature::SentenceCount.extract(text), 2.0);
        assert_eq!(StructuralFeature::AvgSentenceLength.extract(text), 2.0);
        assert_eq!(StructuralFeature::UniqueWordRatio.extract(text), 1.0);
        assert_eq!(StructuralFeature::CharCount.extract("héllo"), 5.0);
        assert_eq!(StructuralFeature::AvgWordLength.extract(""), 0.0);
    }

    #[test]
    fn test_bigrams_and_sublinear_tf() {
        let mut a = current();
        a.vectorizer.vocabulary.insert("capital france".to_string(), 3);
        a.vectorizer.ngram_range = (1, 2);
        a.vectorizer.sublinear_tf = true;
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap();
        // "capital france" bigram hits column 3, which the complex row weighs.
        let dist = c.classify("capital france").unwrap();
        assert!(dist.get(ComplexityLabel::Complex) > dist.get(ComplexityLabel::VerySimple));
    }

    #[test]
    fn test_unbounded_ngram_range_is_rejected() {
        let mut a = current();
        a.vectorizer.ngram_range = (1, usize::MAX);
        let err = TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap_err();
        assert!(matches!(err, RoutingError::ClassifierFormatError(ref m) if m.contains("ngram_range")));

        let mut a = current();
        a.vectorizer.ngram_range = (1, MAX_NGRAM);
        let c = TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap();
        assert!(c.classify("capital france").is_ok());
    }

    #[test]
    fn test_legacy_schema_loads_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, legacy_json()).unwrap();

        let c = TaskClassifier::from_path(&path).unwrap();
        assert_eq!(c.labels(), &ComplexityLabel::ALL);
        assert_eq!(
            c.classify("capital france").unwrap().argmax().0,
            ComplexityLabel::Simple
        );
        let long = "x".repeat(200);
        assert_eq!(c.classify(&long).unwrap().argmax().0, ComplexityLabel::Complex);
    }

    #[test]
    fn test_save_upgrades_legacy_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.json");
        let upgraded = dir.path().join("current.json");
        std::fs::write(&legacy, legacy_json()).unwrap();

        let original = TaskClassifier::from_path(&legacy).unwrap();
        original.save_model(&upgraded).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&upgraded).unwrap()).unwrap();
        assert!(raw.is_object());
        assert_eq!(raw["features"][0], "char_count");

        let reloaded = TaskClassifier::from_path(&upgraded).unwrap();
        let prompt = "What is the capital of France, and why?";
        assert_eq!(
            original.classify(prompt).unwrap(),
            reloaded.classify(prompt).unwrap()
        );
    }

    #[test]
    fn test_missing_file() {
        let err = TaskClassifier::from_path("/nonexistent/classifier.json").unwrap_err();
        assert!(matches!(err, RoutingError::ClassifierFileNotFound(_)));
    }

    #[test]
    fn test_unrecognised_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"weights": [1, 2, 3]}"#).unwrap();
        assert!(matches!(
            TaskClassifier::from_path(&path).unwrap_err(),
            RoutingError::ClassifierFormatError(_)
        ));
    }

    #[test]
    fn test_inconsistent_dimensions() {
        let mut a = current();
        a.model.coefficients[2].push(1.0);
        assert!(matches!(
            TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).unwrap_err(),
            RoutingError::ClassifierFormatError(msg) if msg.contains("row 2")
        ));

        let mut a = current();
        a.labels = vec![ComplexityLabel::Simple, ComplexityLabel::Simple];
        assert!(TaskClassifier::from_artifact(ClassifierArtifact::Current(a)).is_err());
    }

    #[test]
    fn test_save_untrained_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = TaskClassifier::new()
            .save_model(dir.path().join("x.json"))
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            KernelError::Routing(RoutingError::ClassifierNotTrained)
        ));
    }
}
