//! Append-only diagnostic log shared by all lanes of a launch
//!
//! Lanes push entries without coordinating with each other; the host flushes
//! the log to `tracing` after every launch. The log is bounded, and entries
//! pushed while it is full are counted but not kept.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticKind {
    /// The extinction sampled at infinite distance came out below the value
    /// at the star itself
    AsymptoteUndershoot {
        star_am: f64,
        asymptote_am: f64,
        proj_idx: u32,
        x: f64,
        y: f64,
        dist_mod: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostic {
    pub lane: u64,
    pub pixel: u64,
    pub kind: DiagnosticKind,
}

#[derive(Debug)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<Diagnostic>>,
    limit: usize,
    dropped: AtomicUsize,
}

impl DiagnosticLog {
    pub const DEFAULT_LIMIT: usize = 1024;

    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            limit,
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, entry: Diagnostic) {
        let mut entries = self.entries.lock();
        if entries.len() < self.limit {
            entries.push(entry);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every entry, leaving the log empty.
    pub fn take(&self) -> (Vec<Diagnostic>, usize) {
        let entries = std::mem::take(&mut *self.entries.lock());
        (entries, self.dropped.swap(0, Ordering::Relaxed))
    }

    /// Emit every entry as a warning and empty the log. Returns the number of
    /// entries logged or dropped.
    pub fn flush(&self) -> usize {
        let (entries, dropped) = self.take();
        for entry in &entries {
            match entry.kind {
                DiagnosticKind::AsymptoteUndershoot {
                    star_am,
                    asymptote_am,
                    proj_idx,
                    x,
                    y,
                    dist_mod,
                } => warn!(
                    lane = entry.lane,
                    pixel = entry.pixel,
                    star_am,
                    asymptote_am,
                    proj_idx,
                    x,
                    y,
                    dist_mod,
                    "extinction at infinity below extinction at star"
                ),
            }
        }
        if dropped > 0 {
            warn!(dropped, "diagnostic log overflowed");
        }
        entries.len() + dropped
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(lane: u64) -> Diagnostic {
        Diagnostic {
            lane,
            pixel: 0,
            kind: DiagnosticKind::AsymptoteUndershoot {
                star_am: 0.5,
                asymptote_am: 0.4,
                proj_idx: 0,
                x: 0.0,
                y: 0.0,
                dist_mod: 10.0,
            },
        }
    }

    #[test]
    fn overflow_is_counted() {
        let log = DiagnosticLog::new(2);
        for lane in 0..5 {
            log.push(entry(lane));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.flush(), 5);
        assert!(log.is_empty());
        assert_eq!(log.flush(), 0);
    }

    #[test]
    fn take_preserves_push_order_per_lane() {
        let log = DiagnosticLog::default();
        log.push(entry(7));
        log.push(entry(3));
        let (entries, dropped) = log.take();
        assert_eq!(dropped, 0);
        assert_eq!(entries.iter().map(|e| e.lane).collect::<Vec<_>>(), vec![7, 3]);
    }
}
