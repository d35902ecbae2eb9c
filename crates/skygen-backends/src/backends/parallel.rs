//! Parallel harness
//!
//! Groups are scheduled on a rayon pool and the lanes of one group run in
//! order on the worker that picked it up. Lane bodies therefore execute
//! concurrently across groups, as they would on an accelerator.
//!
//! When constructed with [`ParallelHarness::on_device`] the harness reports
//! [`Side::Device`], so callers hand it slices synced into the attached
//! device arena and every host/device transfer is accounted for there.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use skygen_tracing::perf_span;
use skygen_tracing::performance::record_launch;

use crate::backend::traits::validate_launch;
use crate::backend::{LaneContext, LaneHarness, LaunchConfig, LaunchStats, Side};
use crate::error::BackendError;
use crate::memory::DeviceArena;

pub struct ParallelHarness {
    pool: Option<rayon::ThreadPool>,
    device: Option<Arc<DeviceArena>>,
}

impl ParallelHarness {
    /// Host-side parallel harness using the global rayon pool.
    pub fn new() -> Self {
        Self { pool: None, device: None }
    }

    /// Harness whose lanes work on memory resident in `device`.
    pub fn on_device(device: Arc<DeviceArena>) -> Self {
        Self {
            pool: None,
            device: Some(device),
        }
    }

    /// Use a dedicated pool with `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, BackendError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("skygen-lane-{i}"))
            .build()
            .map_err(|err| BackendError::ThreadPool(err.to_string()))?;
        self.pool = Some(pool);
        Ok(self)
    }

    fn run_groups<S, E, F>(config: &LaunchConfig, lanes: &mut [S], body: &F) -> Result<(), E>
    where
        S: Send,
        E: From<BackendError> + Send,
        F: Fn(&LaneContext, &mut S) -> Result<(), E> + Sync,
    {
        let group = config.block.x as usize;
        let active = lanes.len() as u64;
        lanes
            .par_chunks_mut(group)
            .enumerate()
            .try_for_each(|(block, chunk)| {
                let first = (block * group) as u64;
                for (offset, lane) in chunk.iter_mut().enumerate() {
                    let ctx = config.lane_context(first + offset as u64, active);
                    body(&ctx, lane)?;
                }
                Ok(())
            })
    }
}

impl Default for ParallelHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneHarness for ParallelHarness {
    fn name(&self) -> &'static str {
        match self.device {
            Some(_) => "device-parallel",
            None => "host-parallel",
        }
    }

    fn side(&self) -> Side {
        match self.device {
            Some(_) => Side::Device,
            None => Side::Host,
        }
    }

    fn device(&self) -> Option<Arc<DeviceArena>> {
        self.device.clone()
    }

    fn launch<S, E, F>(&self, config: &LaunchConfig, lanes: &mut [S], body: F) -> Result<LaunchStats, E>
    where
        S: Send,
        E: From<BackendError> + Send,
        F: Fn(&LaneContext, &mut S) -> Result<(), E> + Sync,
    {
        validate_launch(config, lanes.len())?;
        let _span = perf_span!("parallel_launch", lanes = lanes.len(), groups = config.total_blocks());
        let start = Instant::now();
        let active = lanes.len() as u64;

        match &self.pool {
            Some(pool) => pool.install(|| Self::run_groups(config, lanes, &body))?,
            None => Self::run_groups(config, lanes, &body)?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{plan_launch, LaunchRequest};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn every_lane_runs_exactly_once() {
        let config = plan_launch(&LaunchRequest::new(1000)).unwrap();
        let mut lanes = vec![u64::MAX; 1000];
        let calls = AtomicU64::new(0);

        let stats = ParallelHarness::new()
            .launch::<_, BackendError, _>(&config, &mut lanes, |ctx, lane| {
                *lane = ctx.global_lane_index();
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();

        assert_eq!(stats.lanes_run, 1000);
        assert_eq!(calls.load(Ordering::Relaxed), 1000);
        assert!(lanes.iter().enumerate().all(|(i, &v)| v == i as u64));
    }

    #[test]
    fn dedicated_pool_matches_sequential() {
        let config = LaunchConfig::linear(64, 8);
        let harness = ParallelHarness::new().with_threads(2).unwrap();
        let mut lanes = vec![0u64; 64];
        harness
            .launch::<_, BackendError, _>(&config, &mut lanes, |ctx, lane| {
                *lane = ctx.block_linear_index() * 100 + ctx.lane_idx as u64;
                Ok(())
            })
            .unwrap();
        assert_eq!(lanes[17], 201);
    }

    #[test]
    fn device_harness_reports_device_side() {
        let harness = ParallelHarness::on_device(DeviceArena::unbounded("test"));
        assert_eq!(harness.side(), Side::Device);
        assert_eq!(harness.name(), "device-parallel");
        assert!(harness.device().is_some());
        assert_eq!(ParallelHarness::new().side(), Side::Host);
    }
}
