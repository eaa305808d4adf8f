//! `tierwise-gateway` - HTTP and command-line surface for tierwise.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`server`] | axum router and [`server::GatewayServer`] |
//! | [`handlers`] | `/generate`, `/stats`, `/health` |
//! | [`auth`] | `X-API-Key` middleware |
//! | [`error`] | [`error::GatewayError`] and its status mapping |
//! | [`config`] | [`config::AppConfig`] |
//! | [`cli`], [`commands`] | the `tierwise` binary |

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use error::{GatewayError, GatewayResult};
pub use server::{GatewayServer, build_router};
pub use state::AppState;
