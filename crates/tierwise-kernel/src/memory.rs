//! System memory observation.

use serde::Serialize;

/// A point-in-time view of system memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemorySnapshot {
    pub fn new(total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            total_bytes,
            available_bytes: available_bytes.min(total_bytes),
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes - self.available_bytes
    }

    /// Used memory as a percentage of total, 0.0 when total is unknown.
    pub fn used_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes() as f64 / self.total_bytes as f64 * 100.0) as f32
    }
}

/// Source of memory snapshots. Swappable so tests can simulate pressure.
pub trait MemoryProbe: Send + Sync {
    fn snapshot(&self) -> MemorySnapshot;
}
