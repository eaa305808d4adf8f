//! Backend loaders
//!
//! - [`OllamaLoader`]: tiers served by an Ollama model server over HTTP
//! - [`SimulatedLoader`]: in-process stand-in with configurable delays

pub mod ollama;
pub mod simulated;

pub use ollama::{OllamaBackend, OllamaConfig, OllamaLoader};
pub use simulated::{SimulatedBackend, SimulatedConfig, SimulatedLoader};
