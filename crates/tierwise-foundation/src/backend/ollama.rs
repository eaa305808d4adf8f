//! Ollama backend
//!
//! Each tier's locator is an Ollama model name. Loading asks the server to
//! bring the model into memory (an empty generate request with `keep_alive`),
//! and unloading sends `keep_alive: 0` so the server frees it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tierwise_kernel::{BackendLoader, BoxError, GenerationBackend, ModelTier, TierSpec};

/// Ollama server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server base URL (default: http://localhost:11434)
    pub base_url: String,
    /// How long the server keeps a loaded model resident, e.g. "30m"
    pub keep_alive: String,
    /// Per-request timeout for generation calls
    pub request_timeout_secs: u64,
    /// Maximum tokens to generate, unlimited when unset
    pub max_tokens: Option<u32>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            keep_alive: "30m".to_string(),
            request_timeout_secs: 120,
            max_tokens: None,
        }
    }
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<KeepAlive<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum KeepAlive<'a> {
    Duration(&'a str),
    Seconds(u64),
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Loads tiers into an Ollama server.
pub struct OllamaLoader {
    config: OllamaConfig,
    client: reqwest::Client,
    // Loads are bounded by the registry's own timeout instead.
    load_client: reqwest::Client,
}

impl OllamaLoader {
    pub fn new(config: OllamaConfig) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let load_client = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            client,
            load_client,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

async fn post_generate(
    client: &reqwest::Client,
    url: &str,
    body: &GenerateRequest<'_>,
) -> Result<GenerateResponse, BoxError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(format!("ollama returned {status}: {text}").into());
    }
    Ok(response.json::<GenerateResponse>().await?)
}

#[async_trait]
impl BackendLoader for OllamaLoader {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn load(
        &self,
        tier: ModelTier,
        spec: &TierSpec,
    ) -> Result<Box<dyn GenerationBackend>, BoxError> {
        let url = self.config.generate_url();
        debug!(tier = %tier, model = %spec.locator, "Warming Ollama model");

        let body = GenerateRequest {
            model: &spec.locator,
            prompt: None,
            stream: false,
            keep_alive: Some(KeepAlive::Duration(&self.config.keep_alive)),
            options: None,
        };
        post_generate(&self.load_client, &url, &body)
            .await
            .map_err(|e| format!("loading '{}': {e}", spec.locator))?;

        Ok(Box::new(OllamaBackend {
            model: spec.locator.clone(),
            url,
            max_tokens: self.config.max_tokens,
            client: self.client.clone(),
        }))
    }

    /// The server keeps warming a model after the client gives up, so ask
    /// it to drop the model right away.
    async fn abort(&self, tier: ModelTier, spec: &TierSpec) -> Result<(), BoxError> {
        debug!(tier = %tier, model = %spec.locator, "Evicting abandoned Ollama load");
        post_generate(&self.client, &self.config.generate_url(), &evict_request(&spec.locator))
            .await?;
        Ok(())
    }
}

fn evict_request(model: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        model,
        prompt: None,
        stream: false,
        keep_alive: Some(KeepAlive::Seconds(0)),
        options: None,
    }
}

/// A model resident in an Ollama server.
pub struct OllamaBackend {
    model: String,
    url: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&mut self, prompt: &str) -> Result<String, BoxError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: Some(prompt),
            stream: false,
            keep_alive: None,
            options: self.max_tokens.map(|num_predict| GenerateOptions { num_predict }),
        };
        Ok(post_generate(&self.client, &self.url, &body).await?.response)
    }

    async fn unload(&mut self) -> Result<(), BoxError> {
        post_generate(&self.client, &self.url, &evict_request(&self.model)).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
