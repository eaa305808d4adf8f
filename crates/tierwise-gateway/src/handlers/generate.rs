//! POST /generate - serve a prompt on the right tier
//!
//! `mode` selects routing: absent or `"adaptive"` classifies the prompt, a
//! complexity name skips the classifier and a tier name pins the tier.
//! Older clients send `model` instead, with `"full"` meaning adaptive.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use tierwise_foundation::GenerationResult;
use tierwise_kernel::{ModelTier, RouteMode};

use super::to_gb;
use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Legacy `model` value that asks for adaptive routing.
const LEGACY_ADAPTIVE: &str = "full";

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl GenerateRequest {
    pub fn route_mode(&self) -> GatewayResult<RouteMode> {
        let raw = match (&self.mode, &self.model) {
            (Some(mode), _) => Some(mode.as_str()),
            (None, Some(model)) if model.trim().eq_ignore_ascii_case(LEGACY_ADAPTIVE) => None,
            (None, model) => model.as_deref(),
        };
        Ok(RouteMode::parse(raw)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMetrics {
    /// Seconds spent in generation
    pub latency: f64,
    /// Percent of system memory in use
    pub memory_usage: f32,
    pub task_complexity: String,
    pub model_usage: BTreeMap<ModelTier, u64>,
    /// Gigabytes saved against the largest tier
    pub memory_savings: f64,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub response: String,
    pub model: ModelTier,
    pub metrics: GenerateMetrics,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> GatewayResult<impl IntoResponse> {
    if req.prompt.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("prompt is empty".into()));
    }
    let mode = req.route_mode()?;
    let request_id = Uuid::new_v4();
    debug!(%request_id, ?mode, prompt_chars = req.prompt.chars().count(), "Generate request");

    let result = state.proxy.adaptive_generate(&req.prompt, mode).await?;
    let model_usage = state.proxy.metrics().per_tier_usage;
    Ok(Json(into_response(result, model_usage)?))
}

fn into_response(
    result: GenerationResult,
    model_usage: BTreeMap<ModelTier, u64>,
) -> GatewayResult<GenerateResponse> {
    if let Some(failure) = result.error {
        return Err(GatewayError::Routing(failure.error));
    }
    let response = result
        .response
        .ok_or_else(|| GatewayError::Internal("generation returned no text".into()))?;

    Ok(GenerateResponse {
        response,
        model: result.tier,
        metrics: GenerateMetrics {
            latency: result.generation_time.as_secs_f64(),
            memory_usage: result.memory_usage_percent,
            task_complexity: result.task_complexity.as_str().to_string(),
            model_usage,
            memory_savings: to_gb(result.memory_saved_bytes),
        },
    })
}

pub fn generate_router() -> axum::Router<Arc<AppState>> {
    use axum::routing::post;
    axum::Router::new().route("/generate", post(generate))
}
