//! Memory probes
//!
//! [`SystemMemoryProbe`] reads live RAM figures through `sysinfo`;
//! [`StaticMemoryProbe`] reports whatever it is told, for tests and demos.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tierwise_kernel::{MemoryProbe, MemorySnapshot};
use tracing::debug;

/// Live system memory via `sysinfo`.
pub struct SystemMemoryProbe {
    sys: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new_with_specifics(
                RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
            )),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn snapshot(&self) -> MemorySnapshot {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        let mut available = sys.available_memory();

        // sysinfo reports 0 where "available" is not tracked (e.g. macOS).
        if available == 0 && total > 0 {
            available = total.saturating_sub(sys.used_memory());
            debug!(available, "available memory not reported, derived from used");
        }
        MemorySnapshot::new(total, available)
    }
}

/// A probe with fixed, settable figures.
#[derive(Debug)]
pub struct StaticMemoryProbe {
    total: AtomicU64,
    available: AtomicU64,
}

impl StaticMemoryProbe {
    pub fn new(total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            total: AtomicU64::new(total_bytes),
            available: AtomicU64::new(available_bytes),
        }
    }

    pub fn set_available(&self, available_bytes: u64) {
        self.available.store(available_bytes, Ordering::SeqCst);
    }

    pub fn set_total(&self, total_bytes: u64) {
        self.total.store(total_bytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for StaticMemoryProbe {
    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot::new(
            self.total.load(Ordering::SeqCst),
            self.available.load(Ordering::SeqCst),
        )
    }
}
