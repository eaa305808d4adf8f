//! Shared application state

use std::sync::Arc;

use tierwise_foundation::AdaptiveProxy;

/// State injected into every handler.
pub struct AppState {
    pub proxy: Arc<AdaptiveProxy>,
    /// Expected `X-API-Key`; `None` disables authentication.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(proxy: Arc<AdaptiveProxy>, api_key: Option<String>) -> Self {
        Self { proxy, api_key }
    }
}
