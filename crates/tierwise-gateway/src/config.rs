//! Application configuration
//!
//! Layered: serde defaults, then an optional TOML/YAML/JSON file, then
//! `TIERWISE_*` environment variables (`TIERWISE_SERVER__PORT=9000`).
//! `API_KEY` is honoured when no key is configured any other way.

use std::collections::BTreeMap;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use tierwise_foundation::ProxyConfig;
use tierwise_foundation::config::{
    BackendSettings, ClassifierSettings, RegistrySettings, TierSettings, default_tiers,
};
use tierwise_kernel::config::load_layered;
use tierwise_kernel::error::{KernelError, KernelResult};
use tierwise_kernel::{ModelTier, RoutingError};

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "TIERWISE";

/// Legacy variable holding the gateway secret.
pub const API_KEY_ENV: &str = "API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret expected in `X-API-Key`. Unset disables auth.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: None,
        }
    }
}

/// Full `tierwise` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierSettings,
    pub registry: RegistrySettings,
    pub backend: BackendSettings,
    pub tiers: BTreeMap<ModelTier, TierSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            classifier: ClassifierSettings::default(),
            registry: RegistrySettings::default(),
            backend: BackendSettings::default(),
            tiers: default_tiers(),
        }
    }
}

impl AppConfig {
    /// Load and validate. `path` is optional; defaults fill every gap.
    pub fn load(path: Option<&Path>) -> KernelResult<Self> {
        let mut config = load_layered::<AppConfig>(path, ENV_PREFIX)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(match path {
                Some(p) => format!("loading configuration from {}", p.display()),
                None => "loading configuration from the environment".to_string(),
            })?;

        if config.server.api_key.is_none() {
            config.server.api_key = std::env::var(API_KEY_ENV).ok();
        }
        config.server.api_key = config.server.api_key.filter(|k| !k.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(Report::new(KernelError::Routing(RoutingError::Config(
                "server.host is empty".into(),
            ))));
        }
        self.proxy()
            .validate()
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach("validating configuration")
    }

    /// The routing part of the configuration.
    pub fn proxy(&self) -> ProxyConfig {
        ProxyConfig {
            classifier: self.classifier.clone(),
            registry: self.registry.clone(),
            backend: self.backend.clone(),
            tiers: self.tiers.clone(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
