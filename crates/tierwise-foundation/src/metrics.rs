//! Request metrics
//!
//! Process-wide counters owned by the proxy. Requests are counted on entry;
//! completed generations add per-tier usage and their memory-saved estimate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use tierwise_kernel::ModelTier;

#[derive(Debug, Default)]
struct Usage {
    per_tier: BTreeMap<ModelTier, u64>,
    memory_saved_bytes: i64,
}

/// Thread-safe request counters.
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    // Per-tier count and saved sum move together under one lock.
    usage: Mutex<Usage>,
}

/// Read-only view of [`MetricsAccumulator`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub per_tier_usage: BTreeMap<ModelTier, u64>,
    pub total_memory_saved_bytes: i64,
}

impl MetricsSnapshot {
    pub fn completed_requests(&self) -> u64 {
        self.per_tier_usage.values().sum()
    }
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an incoming request.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a completed generation on `tier`.
    ///
    /// `memory_saved_bytes` is added as-is, negative values included.
    pub fn record(&self, tier: ModelTier, memory_saved_bytes: i64) {
        let mut usage = self.usage.lock();
        *usage.per_tier.entry(tier).or_insert(0) += 1;
        usage.memory_saved_bytes += memory_saved_bytes;
    }

    /// Count a request that ended in an error-shaped result.
    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let usage = self.usage.lock();
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::SeqCst),
            failed_requests: self.failed_requests.load(Ordering::SeqCst),
            per_tier_usage: usage.per_tier.clone(),
            total_memory_saved_bytes: usage.memory_saved_bytes,
        }
    }
}
