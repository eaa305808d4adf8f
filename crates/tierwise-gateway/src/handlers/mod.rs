//! Request handlers

pub mod generate;
pub mod health;
pub mod stats;

pub use generate::generate_router;
pub use health::health_router;
pub use stats::stats_router;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Bytes to gigabytes, as reported on the wire.
pub(crate) fn to_gb(bytes: i64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}
