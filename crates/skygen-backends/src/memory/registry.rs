//! Process-wide registry of live dual-residency handles
//!
//! The registry holds weak references only. Its single job is the global
//! garbage-collection sweep run when a device allocation fails: every live
//! handle is asked to drop its non-authoritative shadow copy and any stale,
//! unbound array representation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use skygen_tracing::performance::record_gc;

/// What one handle gave back during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcOutcome {
    pub shadows_freed: usize,
    pub arrays_freed: usize,
    pub device_bytes: usize,
}

impl GcOutcome {
    pub fn merge(&mut self, other: GcOutcome) {
        self.shadows_freed += other.shadows_freed;
        self.arrays_freed += other.arrays_freed;
        self.device_bytes += other.device_bytes;
    }
}

/// Result of a global sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcReport {
    /// Live handles that were swept
    pub swept: usize,
    /// Live handles skipped because they were busy
    pub busy: usize,
    pub reclaimed: GcOutcome,
}

/// Implemented by anything that can give memory back on request.
pub(crate) trait Reclaim: Send + Sync {
    /// Reclaim what can be reclaimed, or `None` if the handle is currently
    /// locked by another caller (including the caller that triggered the
    /// sweep).
    fn try_gc(&self) -> Option<GcOutcome>;
}

static GLOBAL: LazyLock<MemoryRegistry> = LazyLock::new(MemoryRegistry::new);

pub struct MemoryRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Weak<dyn Reclaim>>>,
}

impl MemoryRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static MemoryRegistry {
        &GLOBAL
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, id: u64, handle: Weak<dyn Reclaim>) {
        self.live.lock().insert(id, handle);
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.live.lock().remove(&id);
    }

    /// Number of handles currently registered.
    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.live.lock().contains_key(&id)
    }

    /// Sweep every live handle.
    ///
    /// The registry lock is released before any handle is touched, so a
    /// handle dropped concurrently simply fails to upgrade.
    pub fn global_gc(&self) -> GcReport {
        let start = Instant::now();
        let handles: Vec<_> = self.live.lock().values().filter_map(Weak::upgrade).collect();

        let mut report = GcReport::default();
        for handle in handles {
            match handle.try_gc() {
                Some(outcome) => {
                    report.swept += 1;
                    report.reclaimed.merge(outcome);
                }
                None => report.busy += 1,
            }
        }

        record_gc(
            "registry",
            report.reclaimed.arrays_freed,
            report.reclaimed.device_bytes,
            start.elapsed().as_micros() as u64,
        );
        report
    }
}
