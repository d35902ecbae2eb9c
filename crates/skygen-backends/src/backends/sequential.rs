//! Deterministic host harness
//!
//! Visits groups in linear order and lanes within a group in order, building
//! each lane's context explicitly. Two launches over the same inputs execute
//! the same sequence of lane bodies, which makes this the backend to use when
//! reproducing or debugging a pass.

use std::time::Instant;

use skygen_tracing::performance::record_launch;

use crate::backend::traits::validate_launch;
use crate::backend::{LaneContext, LaneHarness, LaunchConfig, LaunchStats, Side};
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, Default)]
pub struct HostSequentialHarness;

impl HostSequentialHarness {
    pub fn new() -> Self {
        Self
    }
}

impl LaneHarness for HostSequentialHarness {
    fn name(&self) -> &'static str {
        "host-sequential"
    }

    fn side(&self) -> Side {
        Side::Host
    }

    fn launch<S, E, F>(&self, config: &LaunchConfig, lanes: &mut [S], body: F) -> Result<LaunchStats, E>
    where
        S: Send,
        E: From<BackendError> + Send,
        F: Fn(&LaneContext, &mut S) -> Result<(), E> + Sync,
    {
        validate_launch(config, lanes.len())?;
        let start = Instant::now();
        let active = lanes.len() as u64;

        for (global, lane) in lanes.iter_mut().enumerate() {
            let ctx = config.lane_context(global as u64, active);
            body(&ctx, lane)?;
        }

        let duration_us = start.elapsed().as_micros() as u64;
        record_launch(self.name(), active, &config.grid.to_string(), duration_us);
        Ok(LaunchStats {
            lanes_run: active,
            blocks: config.total_blocks(),
            duration_us,
        })
    }
}
