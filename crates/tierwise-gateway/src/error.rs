//! Gateway error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tierwise_kernel::RoutingError;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Routing(err) => routing_status(err),
            GatewayError::Unauthorized => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Routing(err) => err.kind(),
            GatewayError::Unauthorized => "Unauthorized",
            GatewayError::InvalidRequest(_) => "InvalidRequest",
            GatewayError::Internal(_) => "InternalError",
        }
    }
}

fn routing_status(err: &RoutingError) -> StatusCode {
    match err {
        RoutingError::UnknownTier(_) | RoutingError::UnknownLabel(_) => StatusCode::BAD_REQUEST,
        RoutingError::InsufficientMemory { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RoutingError::LoadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RoutingError::BackendLoadError { .. } | RoutingError::GenerationFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        RoutingError::ClassifierNotTrained
        | RoutingError::ClassifierFileNotFound(_)
        | RoutingError::ClassifierFormatError(_)
        | RoutingError::Config(_)
        | _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
