//! GET /stats - routing statistics

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use tierwise_kernel::ModelTier;

use super::to_gb;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub loaded_models: Vec<ModelTier>,
    /// Percent of system memory in use
    pub memory_usage: f32,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Gigabytes
    pub total_memory_saved: f64,
    pub model_usage: BTreeMap<ModelTier, u64>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.proxy.stats();
    Json(StatsResponse {
        loaded_models: stats.loaded_models,
        memory_usage: stats.memory_usage_percent,
        total_requests: stats.total_requests,
        failed_requests: stats.failed_requests,
        total_memory_saved: to_gb(stats.total_memory_saved_bytes),
        model_usage: stats.model_usage,
    })
}

pub fn stats_router() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;
    axum::Router::new().route("/stats", get(stats))
}
