//! Crate-level error types for `tierwise-kernel`.
//!
//! Two layers:
//!
//! - [`RoutingError`]: the request-path taxonomy. It is `Clone` so a single
//!   in-flight tier load can hand the same failure to every waiter, and
//!   [`RoutingError::kind`] gives the stable name the HTTP layer puts on the
//!   wire.
//! - [`KernelError`] + [`KernelResult`]: startup-path errors wrapped in
//!   [`error_stack::Report`] so context (which file, which section) can be
//!   attached as they propagate.
//!
//! ```rust,ignore
//! use error_stack::ResultExt;
//! use tierwise_kernel::error::{KernelError, KernelResult};
//!
//! fn read_artifact(path: &str) -> KernelResult<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(KernelError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach(format!("reading classifier artifact {path}"))
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while classifying, routing, loading or generating.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum RoutingError {
    /// The classifier was used before a trained model was loaded.
    #[error("classifier not trained: load a model artifact first")]
    ClassifierNotTrained,

    /// The classifier artifact path does not exist.
    #[error("classifier artifact not found at {}", .0.display())]
    ClassifierFileNotFound(PathBuf),

    /// The classifier artifact matched no recognised schema.
    #[error("classifier artifact format error: {0}")]
    ClassifierFormatError(String),

    /// Not enough free memory to load a tier.
    #[error(
        "insufficient memory to load tier '{tier}': need {required_bytes} bytes, \
         {available_bytes} available (short by {shortfall_bytes})"
    )]
    InsufficientMemory {
        tier: String,
        required_bytes: u64,
        available_bytes: u64,
        shortfall_bytes: u64,
    },

    /// Loading a tier exceeded the configured timeout.
    #[error("loading tier '{tier}' timed out after {timeout:?}")]
    LoadTimeout { tier: String, timeout: Duration },

    /// The backend failed while loading a tier.
    #[error("failed to load tier '{tier}': {message}")]
    BackendLoadError { tier: String, message: String },

    /// A loaded backend failed to generate.
    #[error("generation on tier '{tier}' failed: {message}")]
    GenerationFailed { tier: String, message: String },

    /// A tier name that is not configured or not recognised.
    #[error("unknown tier: {0}")]
    UnknownTier(String),

    /// A complexity label name that is not recognised.
    #[error("unknown complexity label: {0}")]
    UnknownLabel(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RoutingError {
    /// Stable taxonomy name, used as the error code on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassifierNotTrained => "ClassifierNotTrained",
            Self::ClassifierFileNotFound(_) => "ClassifierFileNotFound",
            Self::ClassifierFormatError(_) => "ClassifierFormatError",
            Self::InsufficientMemory { .. } => "InsufficientMemory",
            Self::LoadTimeout { .. } => "LoadTimeout",
            Self::BackendLoadError { .. } => "BackendLoadError",
            Self::GenerationFailed { .. } => "GenerationFailed",
            Self::UnknownTier(_) => "UnknownTier",
            Self::UnknownLabel(_) => "UnknownLabel",
            Self::Config(_) => "ConfigError",
        }
    }

    /// True for failures that happen while acquiring or running a backend.
    ///
    /// `AdaptiveProxy::adaptive_generate` turns these into error-shaped
    /// results; anything else it propagates.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::InsufficientMemory { .. }
                | Self::LoadTimeout { .. }
                | Self::BackendLoadError { .. }
                | Self::GenerationFailed { .. }
                | Self::UnknownTier(_)
        )
    }

    /// True for classifier failures, which have no safe fallback.
    pub fn is_classifier_failure(&self) -> bool {
        matches!(
            self,
            Self::ClassifierNotTrained
                | Self::ClassifierFileNotFound(_)
                | Self::ClassifierFormatError(_)
        )
    }
}

/// Convenience alias for request-path results.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Startup-path error type for `tierwise-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A request-path error surfaced during startup (e.g. classifier load).
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A configuration-related error.
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
