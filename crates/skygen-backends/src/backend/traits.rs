//! The lane-execution harness trait
//!
//! A harness runs one lane body across every lane of a [`LaunchConfig`].
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │   lane body (written once)    │
//!                 │  Fn(&LaneContext, &mut S)     │
//!                 └───────────────┬───────────────┘
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!      ┌─────────────────────┐         ┌─────────────────────┐
//!      │ HostSequentialHarness│         │   ParallelHarness   │
//!      │  lanes 0..N in order │         │ groups run in       │
//!      │  deterministic       │         │ parallel, optional  │
//!      │                      │         │ device residency    │
//!      └─────────────────────┘         └─────────────────────┘
//! ```
//!
//! The body receives an explicit [`LaneContext`] and exclusive access to its
//! own lane state. Lanes coordinate only through whatever shared atomics the
//! body captures. A launch runs to completion or reports the first error; it
//! is never preempted or cancelled midway.

use std::sync::Arc;

use super::types::{LaneContext, LaunchConfig, Side};
use crate::error::BackendError;
use crate::memory::DeviceArena;

/// Summary of a completed launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchStats {
    /// Lanes that ran the body
    pub lanes_run: u64,
    /// Groups scheduled, including groups that only held padding lanes
    pub blocks: u64,
    pub duration_us: u64,
}

/// Runs a per-lane body across a launch shape.
pub trait LaneHarness: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &'static str;

    /// The side whose memory the lanes read and write.
    fn side(&self) -> Side;

    /// Device memory lanes run against, if any. Handles that feed a launch
    /// should be created on this arena.
    fn device(&self) -> Option<Arc<DeviceArena>> {
        None
    }

    /// Run `body` once for every lane state in `lanes`.
    ///
    /// Lane `i` of the slice gets global index `i`. Lanes of the shape beyond
    /// `lanes.len()` are padding and do not run. Fails with
    /// [`BackendError::LaneCapacityExceeded`] if the slice is longer than
    /// the shape holds.
    fn launch<S, E, F>(&self, config: &LaunchConfig, lanes: &mut [S], body: F) -> Result<LaunchStats, E>
    where
        S: Send,
        E: From<BackendError> + Send,
        F: Fn(&LaneContext, &mut S) -> Result<(), E> + Sync;
}

/// Shared argument validation for harness implementations.
pub(crate) fn validate_launch(config: &LaunchConfig, lanes: usize) -> Result<(), BackendError> {
    if config.block.x == 0 || config.grid.total_blocks() == 0 {
        return Err(BackendError::InvalidLaunchConfig(format!("empty launch shape {config}")));
    }
    if lanes as u64 > config.total_lanes() {
        return Err(BackendError::LaneCapacityExceeded {
            lanes,
            capacity: config.total_lanes(),
        });
    }
    Ok(())
}
