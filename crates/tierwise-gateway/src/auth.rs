//! API key authentication
//!
//! Callers present the shared secret in `X-API-Key`. When no key is
//! configured every request passes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::GatewayError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented == Some(expected) {
        next.run(request).await
    } else {
        debug!(
            path = %request.uri().path(),
            has_key = presented.is_some(),
            "Rejected request with invalid API key"
        );
        GatewayError::Unauthorized.into_response()
    }
}
