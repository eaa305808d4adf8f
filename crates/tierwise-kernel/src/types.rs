//! Shared types for complexity classification and tier routing.
//!
//! These types are the vocabulary every other crate speaks: the classifier
//! produces [`ComplexityDistribution`] / [`ClassificationResult`], the routing
//! policy maps a [`ComplexityLabel`] to a [`ModelTier`], and the registry looks
//! up a [`TierSpec`] in a [`TierTable`] to know what to load and what it costs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Estimated difficulty of a prompt, as assigned by the classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLabel {
    VerySimple,
    Simple,
    Medium,
    Complex,
}

impl ComplexityLabel {
    /// Canonical order, simplest first. Distribution slots follow this order.
    pub const ALL: [ComplexityLabel; 4] = [
        ComplexityLabel::VerySimple,
        ComplexityLabel::Simple,
        ComplexityLabel::Medium,
        ComplexityLabel::Complex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerySimple => "very_simple",
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::VerySimple => 0,
            Self::Simple => 1,
            Self::Medium => 2,
            Self::Complex => 3,
        }
    }
}

impl fmt::Display for ComplexityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexityLabel {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very_simple" => Ok(Self::VerySimple),
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            other => Err(RoutingError::UnknownLabel(other.to_string())),
        }
    }
}

/// A named generation-backend configuration with a resource-cost class.
///
/// Ordered from cheapest to most expensive; [`ModelTier::Large`] is the
/// reference tier for the "memory saved" estimate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Tiny,
    Small,
    Mid,
    Large,
}

impl ModelTier {
    pub const ALL: [ModelTier; 4] = [
        ModelTier::Tiny,
        ModelTier::Small,
        ModelTier::Mid,
        ModelTier::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Mid => "mid",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = RoutingError;

    /// Accepts the canonical names plus the quantization-style aliases
    /// (`2bit`, `full`, `4bit`, `8bit`) older deployments used.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiny" | "2bit" => Ok(Self::Tiny),
            "small" | "full" => Ok(Self::Small),
            "mid" | "4bit" => Ok(Self::Mid),
            "large" | "8bit" => Ok(Self::Large),
            other => Err(RoutingError::UnknownTier(other.to_string())),
        }
    }
}

/// What to load for a tier and what it costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    /// Opaque backend locator (model name, path, repository id...)
    pub locator: String,
    /// Approximate resident size once loaded, in bytes
    pub size_bytes: u64,
}

impl TierSpec {
    pub fn new(locator: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            locator: locator.into(),
            size_bytes,
        }
    }
}

/// The fixed set of tiers a deployment can route to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    tiers: BTreeMap<ModelTier, TierSpec>,
}

impl TierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, tier: ModelTier, spec: TierSpec) -> Self {
        self.tiers.insert(tier, spec);
        self
    }

    pub fn insert(&mut self, tier: ModelTier, spec: TierSpec) {
        self.tiers.insert(tier, spec);
    }

    /// Look up a tier, failing with `UnknownTier` when it is not configured.
    pub fn get(&self, tier: ModelTier) -> Result<&TierSpec, RoutingError> {
        self.tiers
            .get(&tier)
            .ok_or_else(|| RoutingError::UnknownTier(tier.to_string()))
    }

    pub fn contains(&self, tier: ModelTier) -> bool {
        self.tiers.contains_key(&tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelTier, &TierSpec)> {
        self.tiers.iter().map(|(tier, spec)| (*tier, spec))
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The most expensive configured tier (highest in tier order).
    pub fn largest(&self) -> Option<(ModelTier, &TierSpec)> {
        self.tiers.iter().next_back().map(|(tier, spec)| (*tier, spec))
    }

    /// Bytes saved by serving on `tier` instead of the largest tier.
    ///
    /// Signed and unclamped: aggregate statistics sum these values as-is.
    pub fn memory_saved(&self, tier: ModelTier) -> Result<i64, RoutingError> {
        let used = self.get(tier)?.size_bytes as i64;
        let largest = self
            .largest()
            .map(|(_, spec)| spec.size_bytes as i64)
            .unwrap_or(used);
        Ok(largest - used)
    }
}

/// Probability mass per canonical complexity label.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComplexityDistribution {
    probs: [f32; 4],
}

impl ComplexityDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(label, probability)` pairs; unnamed labels stay at zero.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ComplexityLabel, f32)>) -> Self {
        let mut dist = Self::default();
        for (label, prob) in pairs {
            dist.set(label, prob);
        }
        dist
    }

    pub fn set(&mut self, label: ComplexityLabel, prob: f32) {
        self.probs[label.index()] = prob;
    }

    pub fn get(&self, label: ComplexityLabel) -> f32 {
        self.probs[label.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComplexityLabel, f32)> + '_ {
        ComplexityLabel::ALL
            .iter()
            .map(move |label| (*label, self.get(*label)))
    }

    /// Most probable label. Ties go to the simpler label.
    pub fn argmax(&self) -> (ComplexityLabel, f32) {
        let mut best = (ComplexityLabel::VerySimple, self.probs[0]);
        for (label, prob) in self.iter().skip(1) {
            if prob > best.1 {
                best = (label, prob);
            }
        }
        best
    }
}

impl Serialize for ComplexityDistribution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(4))?;
        for (label, prob) in self.iter() {
            map.serialize_entry(label.as_str(), &prob)?;
        }
        map.end()
    }
}

/// Outcome of a thresholded classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "label")]
pub enum Classification {
    /// The argmax label cleared the confidence threshold.
    Confident(ComplexityLabel),
    /// The argmax label fell below the threshold; never routed as-is.
    Uncertain,
}

/// Label plus the confidence it was chosen with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    /// Argmax label regardless of threshold, kept for diagnostics.
    pub best_guess: ComplexityLabel,
    /// Probability of `best_guess`.
    pub confidence: f32,
}

impl ClassificationResult {
    /// Apply a threshold to a distribution.
    ///
    /// The argmax label is kept when its probability is at least `threshold`,
    /// otherwise the result is [`Classification::Uncertain`].
    pub fn from_distribution(dist: &ComplexityDistribution, threshold: f32) -> Self {
        let (best_guess, confidence) = dist.argmax();
        let classification = if confidence >= threshold {
            Classification::Confident(best_guess)
        } else {
            Classification::Uncertain
        };
        Self {
            classification,
            best_guess,
            confidence,
        }
    }

    pub fn is_uncertain(&self) -> bool {
        self.classification == Classification::Uncertain
    }

    /// The label routing should use: uncertain always resolves to `Medium`.
    pub fn resolved_label(&self) -> ComplexityLabel {
        match self.classification {
            Classification::Confident(label) => label,
            Classification::Uncertain => ComplexityLabel::Medium,
        }
    }
}

/// How the caller wants a request routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RouteMode {
    /// Classify the prompt and route on the result.
    #[default]
    Adaptive,
    /// Skip classification and route as if the classifier returned this label.
    Complexity(ComplexityLabel),
    /// Skip classification and routing, serve on this tier.
    Tier(ModelTier),
}

impl RouteMode {
    /// Parse an optional caller-supplied mode.
    ///
    /// `None`, an empty string and `"adaptive"` map to [`RouteMode::Adaptive`].
    /// Label names win over tier names; anything else is an `UnknownTier`.
    pub fn parse(mode: Option<&str>) -> Result<Self, RoutingError> {
        let Some(raw) = mode else {
            return Ok(Self::Adaptive);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("adaptive") {
            return Ok(Self::Adaptive);
        }
        if let Ok(label) = trimmed.parse::<ComplexityLabel>() {
            return Ok(Self::Complexity(label));
        }
        trimmed
            .parse::<ModelTier>()
            .map(Self::Tier)
            .map_err(|_| RoutingError::UnknownTier(trimmed.to_string()))
    }
}
