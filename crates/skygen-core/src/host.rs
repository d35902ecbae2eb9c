//! Host-side driver
//!
//! [`SkyGenerator`] owns everything a run needs and sequences the launches
//! of one logical pass:
//!
//! ```text
//!   integrate_counts ── 1 launch ──► CountSummary (calibrates norm)
//!
//!   draw ── reset checkpoints
//!            loop:
//!              launch draw body
//!              flush diagnostics
//!              drain(sink)            caller consumes and resets the sink
//!              no lane continuing? ─► done
//! ```
//!
//! Launches never overlap. Checkpoints, random streams and pixels are synced
//! to the harness side before a launch and stay there between launches.

use std::time::Instant;

use skygen_backends::{plan_launch, LaneHarness, LaunchConfig, LaunchRequest, LaunchStats};
use skygen_tracing::performance::record_pass;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::SkygenConfig;
use crate::diagnostics::DiagnosticLog;
use crate::error::{Result, SkygenError};
use crate::extinction::ExtinctionSource;
use crate::model::DensityModel;
use crate::pixel::Footprint;
use crate::rng::{MwcState, StreamPool};
use crate::sampler::{CountLane, DrawLane, Sampler, SamplerParams};
use crate::sink::StarSink;

/// Result of the counting pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountSummary {
    /// Expected number of stars in the pixels, ignoring coverage
    pub count: f64,
    /// Expected number of stars inside the footprint
    pub covered: f64,
    pub max_rho: f64,
    pub cells: u64,
    /// Coverage-weighted expected count per pixel
    pub per_pixel: Vec<f64>,
    pub histogram: Vec<u64>,
    /// Normalization the drawing pass will use
    pub norm: f64,
    pub launch: LaunchStats,
}

/// Result of one drawing launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Stars written into the sink by this launch
    pub written: usize,
    /// Lanes with work left
    pub continuing: usize,
    /// Diagnostic entries flushed after the launch
    pub diagnostics: usize,
    pub stats: LaunchStats,
}

/// Result of a full drawing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSummary {
    pub launches: usize,
    pub stars_written: usize,
    pub diagnostics: usize,
}

pub struct SkyGenerator<M: DensityModel, X: ExtinctionSource, H: LaneHarness> {
    config: SkygenConfig,
    params: SamplerParams,
    model: M,
    footprint: Footprint,
    extinction: X,
    harness: H,
    launch: LaunchConfig,
    lanes: usize,
    streams: StreamPool,
    checkpoints: CheckpointStore<M::State>,
    diagnostics: DiagnosticLog,
}

impl<M, X, H> SkyGenerator<M, X, H>
where
    M: DensityModel,
    X: ExtinctionSource,
    H: LaneHarness,
{
    pub fn new(config: SkygenConfig, model: M, footprint: Footprint, extinction: X, harness: H) -> Result<Self> {
        config.validate()?;

        let per_lane = model.scratch_bytes_per_lane() + std::mem::size_of::<MwcState>();
        let request = LaunchRequest::new(config.lanes)
            .with_group_size(config.group_size)
            .with_scratch(per_lane, config.static_scratch, config.scratch_budget);
        let launch = plan_launch(&request).ok_or(SkygenError::LaunchShape {
            lanes: config.lanes,
            per_lane,
            budget: config.scratch_budget,
        })?;

        let lanes = usize::try_from(config.lanes)
            .map_err(|_| SkygenError::Config(format!("{} lanes do not fit in memory", config.lanes)))?;
        let device = harness.device();
        let streams = StreamPool::seeded(config.streams, config.seed, device.clone())?;
        streams.check_lanes(lanes)?;
        let checkpoints = CheckpointStore::new(lanes, device.clone())?;
        let footprint = if device.is_some() && footprint.beams().device().is_none() {
            footprint.on_device(device.clone())?
        } else {
            footprint
        };

        info!(
            harness = harness.name(),
            lanes,
            launch = %launch,
            pixels = footprint.len(),
            cells_per_pixel = config.grid_shape().cells(),
            "sky generator ready"
        );

        Ok(Self {
            params: SamplerParams::from_config(&config),
            config,
            model,
            footprint,
            extinction,
            harness,
            launch,
            lanes,
            streams,
            checkpoints,
            diagnostics: DiagnosticLog::default(),
        })
    }

    pub fn config(&self) -> &SkygenConfig {
        &self.config
    }

    pub fn params(&self) -> &SamplerParams {
        &self.params
    }

    pub fn launch_config(&self) -> &LaunchConfig {
        &self.launch
    }

    pub fn checkpoints(&self) -> &CheckpointStore<M::State> {
        &self.checkpoints
    }

    pub fn streams(&self) -> &StreamPool {
        &self.streams
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    /// Run the counting pass and, if a target count is configured, rescale
    /// the normalization the drawing pass uses.
    #[tracing::instrument(skip_all, fields(lanes = self.lanes))]
    pub fn integrate_counts(&mut self) -> Result<CountSummary> {
        self.params.norm = self.config.norm;
        let side = self.harness.side();
        let field = self.extinction.bind()?;

        let (lanes, stats) = {
            let beams = self.footprint.beams().read_on(side)?;
            let sampler = Sampler::new(
                &self.params,
                &self.model,
                &beams,
                self.footprint.projections(),
                &field,
                &self.diagnostics,
            );
            let mut lanes = vec![CountLane::default(); self.lanes];
            let stats = self
                .harness
                .launch(&self.launch, &mut lanes, |ctx, lane| sampler.count(ctx, lane))?;
            (lanes, stats)
        };
        self.diagnostics.flush();

        let mut summary = CountSummary {
            per_pixel: vec![0.0; self.footprint.len()],
            launch: stats,
            ..CountSummary::default()
        };
        for lane in &lanes {
            summary.count += lane.count;
            summary.covered += lane.covered;
            summary.max_rho = summary.max_rho.max(lane.max_rho);
            summary.cells += lane.cells;
            for &(pixel, sum) in &lane.per_pixel {
                summary.per_pixel[pixel as usize] += sum;
            }
            if summary.histogram.len() < lane.histogram.len() {
                summary.histogram.resize(lane.histogram.len(), 0);
            }
            for (total, n) in summary.histogram.iter_mut().zip(&lane.histogram) {
                *total += n;
            }
        }

        if let Some(target) = self.config.target_count {
            if summary.covered > 0.0 {
                self.params.norm = self.config.norm * target / summary.covered;
            } else {
                warn!(target, "nothing to calibrate against: footprint integrates to zero");
            }
        }
        summary.norm = self.params.norm;

        record_pass("count", summary.cells, stats.duration_us);
        info!(
            count = summary.count,
            covered = summary.covered,
            max_rho = summary.max_rho,
            norm = summary.norm,
            "counting pass complete"
        );
        Ok(summary)
    }

    /// Forget all lane progress; the next launch starts a new pass.
    pub fn reset_checkpoints(&self) -> Result<()> {
        self.checkpoints.reset()
    }

    /// One drawing launch, resuming every lane from its checkpoint.
    #[tracing::instrument(skip_all, fields(lanes = self.lanes))]
    pub fn draw_launch<K: StarSink>(&self, sink: &K) -> Result<LaunchOutcome> {
        let side = self.harness.side();
        let field = self.extinction.bind()?;
        let before = sink.len();

        let stats = {
            let beams = self.footprint.beams().read_on(side)?;
            let mut checkpoints = self.checkpoints.lanes_on(side)?;
            let mut rngs = self.streams.lane_states(self.lanes, side)?;
            let mut lanes: Vec<DrawLane<'_, M::State>> = checkpoints
                .iter_mut()
                .zip(rngs.iter_mut())
                .map(|(checkpoint, rng)| DrawLane { checkpoint, rng })
                .collect();
            let sampler = Sampler::new(
                &self.params,
                &self.model,
                &beams,
                self.footprint.projections(),
                &field,
                &self.diagnostics,
            );
            self.harness
                .launch(&self.launch, &mut lanes, |ctx, lane| sampler.draw(ctx, lane, sink))?
        };
        let flushed = self.diagnostics.flush();

        let outcome = LaunchOutcome {
            written: sink.len().saturating_sub(before),
            continuing: self.checkpoints.continuing()?,
            diagnostics: flushed,
            stats,
        };
        debug!(
            written = outcome.written,
            continuing = outcome.continuing,
            diagnostics = outcome.diagnostics,
            "drawing launch complete"
        );
        Ok(outcome)
    }

    /// Run a complete drawing pass. `drain` is called after every launch and
    /// must empty the sink for the pass to make progress.
    ///
    /// Fails with [`SkygenError::SinkStalled`] when a launch that had room
    /// wrote nothing, or when the sink is still full after draining.
    #[tracing::instrument(skip_all, fields(capacity = sink.capacity()))]
    pub fn draw<K, F>(&mut self, sink: &K, mut drain: F) -> Result<DrawSummary>
    where
        K: StarSink,
        F: FnMut(&K) -> Result<()>,
    {
        let start = Instant::now();
        self.reset_checkpoints()?;
        let mut summary = DrawSummary::default();
        loop {
            let had_room = !sink.is_full();
            let outcome = self.draw_launch(sink)?;
            summary.launches += 1;
            summary.stars_written += outcome.written;
            summary.diagnostics += outcome.diagnostics;
            drain(sink)?;

            if outcome.continuing == 0 {
                break;
            }
            // a full sink only stalls the pass if draining left it full
            if outcome.written == 0 && (had_room || sink.is_full()) {
                return Err(SkygenError::SinkStalled {
                    continuing: outcome.continuing,
                });
            }
        }

        record_pass("draw", summary.stars_written as u64, start.elapsed().as_micros() as u64);
        info!(
            launches = summary.launches,
            stars = summary.stars_written,
            "drawing pass complete"
        );
        Ok(summary)
    }

    /// Counting pass followed by a drawing pass.
    pub fn run<K, F>(&mut self, sink: &K, drain: F) -> Result<(CountSummary, DrawSummary)>
    where
        K: StarSink,
        F: FnMut(&K) -> Result<()>,
    {
        let counts = self.integrate_counts()?;
        let draws = self.draw(sink, drain)?;
        Ok((counts, draws))
    }
}
