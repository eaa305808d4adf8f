//! Axum HTTP server
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | no | Liveness check |
//! | `POST` | `/generate` | yes | Classify, route and generate |
//! | `GET`  | `/stats` | yes | Loaded tiers, memory and request counters |

use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tierwise_foundation::AdaptiveProxy;

use crate::auth::require_api_key;
use crate::handlers::{generate_router, health_router, stats_router};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the application router over `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(generate_router())
        .merge(stats_router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .merge(health_router())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

pub struct GatewayServer {
    addr: String,
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(addr: impl Into<String>, proxy: Arc<AdaptiveProxy>, api_key: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            state: Arc::new(AppState::new(proxy, api_key)),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C, then release every loaded tier.
    pub async fn start(self) -> std::io::Result<()> {
        if self.state.api_key.is_none() {
            warn!("No API key configured; /generate and /stats are unauthenticated");
        }

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!(addr = %self.addr, "Tierwise gateway listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.state.proxy.shutdown().await;
        info!("Tierwise gateway stopped");
        served
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
