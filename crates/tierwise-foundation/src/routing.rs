//! Routing policy: complexity label to tier.
//!
//! A fixed table with no state. Unrecognised label names fall back to the mid
//! tier; with a healthy classifier that path is never taken because uncertain
//! results are already resolved to `medium`.

use tierwise_kernel::{ComplexityLabel, ModelTier};

/// Tier used when a label is not recognised.
pub const DEFAULT_TIER: ModelTier = ModelTier::Mid;

/// Tier for a canonical label.
pub fn tier_for(label: ComplexityLabel) -> ModelTier {
    match label {
        ComplexityLabel::VerySimple => ModelTier::Tiny,
        ComplexityLabel::Simple => ModelTier::Small,
        ComplexityLabel::Medium => ModelTier::Mid,
        ComplexityLabel::Complex => ModelTier::Large,
    }
}

/// Tier for a label name. Never fails.
pub fn select_model(label: &str) -> ModelTier {
    label
        .parse::<ComplexityLabel>()
        .map(tier_for)
        .unwrap_or(DEFAULT_TIER)
}
