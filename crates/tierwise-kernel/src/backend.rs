//! Generation backend contracts.
//!
//! The router never touches weights or inference kernels. It asks a
//! [`BackendLoader`] to turn a [`TierSpec`] into a loaded
//! [`GenerationBackend`], and asks that backend for text.

use async_trait::async_trait;

use crate::types::{ModelTier, TierSpec};

/// Error type plug-in backends report with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A loaded, generation-capable model instance for one tier.
///
/// Not assumed re-entrant: callers serialise access to a single instance.
#[async_trait]
pub trait GenerationBackend: Send {
    /// Generate a completion for `prompt`.
    async fn generate(&mut self, prompt: &str) -> Result<String, BoxError>;

    /// Free whatever the backend holds outside this process (GPU memory,
    /// a model server's resident copy...). Called once, right before drop.
    async fn unload(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Short description for logs.
    fn describe(&self) -> String {
        "backend".to_string()
    }
}

/// Produces loaded backends from tier specs.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    /// Loader name for logs and `/stats`.
    fn name(&self) -> &str;

    /// Load the model described by `spec`.
    ///
    /// May take seconds to minutes. The caller bounds it with a timeout and
    /// drops the future on expiry, so implementations must not leave shared
    /// state behind when cancelled.
    async fn load(
        &self,
        tier: ModelTier,
        spec: &TierSpec,
    ) -> Result<Box<dyn GenerationBackend>, BoxError>;

    /// Release whatever a failed or timed-out [`load`](Self::load) of `tier`
    /// may still hold outside this process.
    ///
    /// Called once after each failed load. The default does nothing.
    async fn abort(&self, _tier: ModelTier, _spec: &TierSpec) -> Result<(), BoxError> {
        Ok(())
    }
}
