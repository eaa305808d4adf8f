//! Tierwise testing utilities
//!
//! Deterministic classifiers, small classifier artifacts and a proxy
//! harness over the simulated backend, so routing can be exercised end to
//! end without a model server.

pub mod artifact;
pub mod classifier;
pub mod harness;

pub use artifact::{keyword_artifact, legacy_keyword_artifact, write_artifact};
pub use classifier::ScriptedClassifier;
pub use harness::{GB, ProxyHarness};

/// Assert that a generation succeeded on the expected tier.
#[macro_export]
macro_rules! assert_routed {
    ($result:expr, $tier:expr) => {
        let result = &$result;
        assert!(
            result.error.is_none(),
            "Expected a response from tier '{}', got error {:?}",
            $tier,
            result.error
        );
        assert_eq!(
            result.tier, $tier,
            "Expected routing to tier '{}', but was routed to '{}'",
            $tier, result.tier
        );
    };
}
