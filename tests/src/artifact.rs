//! Classifier artifact builders
//!
//! A five-term keyword model that behaves predictably:
//!
//! | Prompt mentions | Label |
//! |-----------------|-------|
//! | `capital`, `france` | simple |
//! | `explain` | medium |
//! | `prove`, `theorem` | complex |
//! | nothing known | very_simple |
//!
//! `explain` together with `theorem` splits medium and complex evenly, so
//! the classifier is uncertain.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tierwise_foundation::classifier::{
    ClassifierArtifact, CurrentArtifact, LegacyArtifact, LinearModelArtifact, VectorizerArtifact,
};
use tierwise_kernel::ComplexityLabel;

const TERMS: [&str; 5] = ["capital", "france", "prove", "theorem", "explain"];

fn vectorizer() -> VectorizerArtifact {
    VectorizerArtifact {
        vocabulary: TERMS
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect::<BTreeMap<_, _>>(),
        idf: vec![1.0; TERMS.len()],
        ngram_range: (1, 1),
        sublinear_tf: false,
        lowercase: true,
    }
}

/// Coefficient rows in canonical label order, TF-IDF columns only.
fn rows() -> Vec<Vec<f32>> {
    vec![
        vec![0.0, 0.0, 0.0, 0.0, 0.0],
        vec![8.0, 8.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0, 8.0],
        vec![0.0, 0.0, 8.0, 8.0, 0.0],
    ]
}

const INTERCEPTS: [f32; 4] = [3.0, 0.0, 0.0, 0.0];

/// The keyword model in the current schema.
pub fn keyword_artifact() -> CurrentArtifact {
    CurrentArtifact {
        labels: ComplexityLabel::ALL.to_vec(),
        vectorizer: vectorizer(),
        features: Vec::new(),
        scaler: None,
        model: LinearModelArtifact {
            coefficients: rows(),
            intercepts: INTERCEPTS.to_vec(),
        },
    }
}

/// The keyword model in the legacy `[vectorizer, model]` schema, with a zero
/// weight on the trailing character-length column.
pub fn legacy_keyword_artifact() -> LegacyArtifact {
    let coefficients = rows()
        .into_iter()
        .map(|mut row| {
            row.push(0.0);
            row
        })
        .collect();
    LegacyArtifact(
        vectorizer(),
        LinearModelArtifact {
            coefficients,
            intercepts: INTERCEPTS.to_vec(),
        },
    )
}

/// Serialise `artifact` as `dir/name` and return the path.
pub fn write_artifact(dir: &Path, name: &str, artifact: &ClassifierArtifact) -> PathBuf {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(artifact).expect("artifact serialises");
    std::fs::write(&path, json).expect("artifact written");
    path
}
