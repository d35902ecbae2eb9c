//! Timed spans and the standard sampler events
//!
//! Events share an `event` field so log collectors can pick them out:
//!
//! ```text
//!   event = "transfer"   handle, bytes, direction, duration, bandwidth
//!   event = "launch"     harness, lanes, grid, duration, lanes/s
//!   event = "gc"         scope, arrays swept, bytes reclaimed
//!   event = "pass"       counting or drawing pass, items, items/s
//! ```
//!
//! ```rust
//! use skygen_tracing::performance::{record_transfer, TimedSpan};
//!
//! let span = TimedSpan::new("sync_to_device");
//! // ... copy ...
//! drop(span);
//!
//! record_transfer(7, 4096, "H2D", 250);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tracing::span::EnteredSpan;
use tracing::Span;

use crate::PerfTracing;

static ENABLED: AtomicBool = AtomicBool::new(true);
/// `u64::MAX` means no threshold.
static THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Apply timed-span settings process-wide.
pub fn configure(perf: &PerfTracing) {
    ENABLED.store(perf.enabled, Ordering::Relaxed);
    THRESHOLD_US.store(perf.threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

fn threshold_us() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        t => Some(t),
    }
}

/// Logs its own duration at debug level when dropped.
pub struct TimedSpan {
    span: Span,
    start: Instant,
    threshold_us: Option<u64>,
    enabled: bool,
    /// Exited after the duration is logged
    fields: Option<EnteredSpan>,
}

impl TimedSpan {
    /// Span using the process-wide threshold.
    pub fn new(name: &str) -> Self {
        Self::with_threshold(name, threshold_us())
    }

    pub fn with_threshold(name: &str, threshold_us: Option<u64>) -> Self {
        Self {
            span: tracing::debug_span!("perf", name),
            start: Instant::now(),
            threshold_us,
            enabled: ENABLED.load(Ordering::Relaxed),
            fields: None,
        }
    }

    /// Keep `fields` entered for as long as this span lives.
    pub fn within(mut self, fields: EnteredSpan) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for TimedSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.enabled && self.threshold_us.is_none_or(|t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(duration_us = elapsed_us, "timed span closed");
        }
    }
}

fn rate(count: f64, duration_us: u64) -> f64 {
    match duration_us {
        0 => 0.0,
        us => count * 1e6 / us as f64,
    }
}

/// A copy of handle `handle` to the other side; `direction` is `"H2D"` or
/// `"D2H"`.
pub fn record_transfer(handle: u64, bytes: usize, direction: &str, duration_us: u64) {
    tracing::debug!(
        event = "transfer",
        handle,
        bytes,
        direction,
        duration_us,
        mib_per_sec = rate(bytes as f64, duration_us) / (1024.0 * 1024.0),
        "transfer"
    );
}

pub fn record_launch(harness: &str, lanes: u64, grid: &str, duration_us: u64) {
    tracing::debug!(
        event = "launch",
        harness,
        lanes,
        grid,
        duration_us,
        lanes_per_sec = rate(lanes as f64, duration_us),
        "launch"
    );
}

/// A sweep of unbound device arrays; `scope` is `"handle"` or `"registry"`.
pub fn record_gc(scope: &str, arrays_swept: usize, bytes_reclaimed: usize, duration_us: u64) {
    tracing::debug!(event = "gc", scope, arrays_swept, bytes_reclaimed, duration_us, "gc sweep");
}

/// One counting or drawing pass over `items` cells or stars.
pub fn record_pass(pass: &str, items: u64, duration_us: u64) {
    tracing::debug!(
        event = "pass",
        pass,
        items,
        duration_us,
        items_per_sec = rate(items as f64, duration_us),
        "pass"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_measures_elapsed_time() {
        let span = TimedSpan::with_threshold("sleep", None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(span.elapsed_us() >= 1000);
    }

    #[test]
    fn rate_handles_zero_duration() {
        assert_eq!(rate(1024.0, 0), 0.0);
        assert_eq!(rate(10.0, 1_000_000), 10.0);
    }

    #[test]
    fn configure_sets_the_default_threshold() {
        configure(&PerfTracing {
            enabled: true,
            threshold_us: Some(500),
            filter: None,
        });
        assert_eq!(TimedSpan::new("configured").threshold_us, Some(500));
        configure(&PerfTracing {
            enabled: true,
            ..PerfTracing::default()
        });
        assert_eq!(TimedSpan::new("unlimited").threshold_us, None);
    }

    #[test]
    fn events_without_subscriber() {
        record_transfer(1, 4096, "H2D", 0);
        record_launch("host-sequential", 1152, "(6, 1, 1)", 10);
        record_gc("registry", 3, 1 << 20, 5);
        record_pass("count", 1000, 100);
    }
}
