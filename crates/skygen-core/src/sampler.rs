//! The per-lane sampler body
//!
//! One [`Sampler`] is shared by every lane of a launch. It walks the lane's
//! share of the (pixel × apparent bin × absolute bin) cells and evaluates
//! the expected star count in each:
//!
//! ```text
//!   rho = density(state, M) · norm · D³ · dA · 0.2 ln 10 · dm · dM
//! ```
//!
//! The counting pass ([`Sampler::count`]) sums `rho`. The drawing pass
//! ([`Sampler::draw`]) turns it into a Poisson number of stars and writes
//! them to the sink, checkpointing whenever the sink runs out of room:
//!
//! ```text
//!   load checkpoint ──► flush pending draws ──► pending == 0? ──no──► store, return
//!                                                   │ yes
//!                              ┌────────────────────┘
//!                              ▼
//!                         next cell ──none left──► store Finished, return
//!                              │
//!              distance bin changed? ──yes──► refresh distance, extinction,
//!                              │                  position, model state
//!                              ▼
//!                 skip if outside distance limits or too faint
//!                              ▼
//!                 pending = poisson(rho); draw stars
//! ```
//!
//! Per-diagonal values (distance, extinction, position and model state) are
//! cached in the lane and recomputed only when the walk leaves a diagonal.

use skygen_backends::LaneContext;

use crate::checkpoint::{CellCache, LaneCheckpoint, LaneStatus};
use crate::config::{HistogramConfig, SkygenConfig};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::error::Result;
use crate::extinction::{ExtinctionField, DM_INFINITY};
use crate::model::DensityModel;
use crate::pixel::{Direction, LambertProjection, PencilBeam, HEMISPHERE_R2};
use crate::rng::{LaneRng, MwcState};
use crate::sink::{StarRecord, StarSink};
use crate::traversal::{DiagonalCursor, GridShape, LaneWalker};

/// `0.2 · ln 10`: converts a per-magnitude luminosity function into the
/// volume element of a distance-modulus bin.
pub const POGSON: f64 = 0.460_517_018_598_809_1;

/// Distance in parsecs for distance modulus `dm`.
#[inline]
pub fn distance_pc(dm: f64) -> f64 {
    10f64.powf(0.2 * dm + 1.0)
}

/// Everything about a pass that is the same for every lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParams {
    pub shape: GridShape,
    pub block_size: u32,
    pub m0: f64,
    pub m1: f64,
    pub dm: f64,
    pub abs_mag_faint: f64,
    pub d_abs_mag: f64,
    pub dmin: f64,
    pub dmax: f64,
    pub norm: f64,
    pub sun_distance: f64,
    pub histogram: Option<HistogramConfig>,
}

impl SamplerParams {
    pub fn from_config(config: &SkygenConfig) -> Self {
        Self {
            shape: config.grid_shape(),
            block_size: config.block_size,
            m0: config.m0,
            m1: config.m1,
            dm: config.dm,
            abs_mag_faint: config.abs_mag_faint,
            d_abs_mag: config.d_abs_mag,
            dmin: config.dmin,
            dmax: config.dmax,
            norm: config.norm,
            sun_distance: config.sun_distance_pc,
            histogram: config.histogram,
        }
    }

    /// Apparent magnitude at the centre of bin `im`.
    #[inline]
    pub fn apparent_mag(&self, im: u32) -> f64 {
        self.m0 + self.dm * f64::from(im)
    }

    /// Absolute magnitude at the centre of bin `i_abs`.
    #[inline]
    pub fn absolute_mag(&self, i_abs: u32) -> f64 {
        self.abs_mag_faint - self.d_abs_mag * f64::from(i_abs)
    }

    #[inline]
    fn outside_distance_limits(&self, distance: f64) -> bool {
        (self.dmin != 0.0 || self.dmax != 0.0) && (self.dmin > distance || self.dmax <= distance)
    }
}

/// Accumulators of one lane in the counting pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountLane {
    /// Sum of rho over every evaluated cell
    pub count: f64,
    /// Sum of rho weighted by pixel coverage
    pub covered: f64,
    pub max_rho: f64,
    pub cells: u64,
    /// Coverage-weighted sums per pixel, in visiting order
    pub per_pixel: Vec<(u64, f64)>,
    pub histogram: Vec<u64>,
}

impl CountLane {
    fn record(&mut self, pixel: u64, rho: f64, coverage: f64, histogram: Option<&HistogramConfig>) {
        let weighted = rho * coverage;
        self.count += rho;
        self.covered += weighted;
        self.max_rho = self.max_rho.max(rho);
        self.cells += 1;

        match self.per_pixel.last_mut() {
            Some((last, sum)) if *last == pixel => *sum += weighted,
            _ => self.per_pixel.push((pixel, weighted)),
        }

        if let Some(hist) = histogram.filter(|hist| hist.nbins > 0) {
            if self.histogram.len() != hist.nbins {
                self.histogram.resize(hist.nbins, 0);
            }
            // empty cells land in bin 0
            self.histogram[hist.bin(rho)] += 1;
        }
    }
}

/// One lane's slots in the drawing pass.
#[derive(Debug)]
pub struct DrawLane<'a, S> {
    pub checkpoint: &'a mut LaneCheckpoint<S>,
    pub rng: &'a mut MwcState,
}

/// Lane-local walk state.
struct Walk<S> {
    walker: LaneWalker,
    cache: CellCache,
    model_state: S,
}

enum Visit {
    Done,
    Skipped,
    Cell(f64),
}

pub struct Sampler<'a, M: DensityModel, X: ExtinctionField> {
    params: &'a SamplerParams,
    model: &'a M,
    beams: &'a [PencilBeam],
    projections: &'a [LambertProjection; 2],
    extinction: &'a X,
    diagnostics: &'a DiagnosticLog,
}

impl<'a, M: DensityModel, X: ExtinctionField> Sampler<'a, M, X> {
    pub fn new(
        params: &'a SamplerParams,
        model: &'a M,
        beams: &'a [PencilBeam],
        projections: &'a [LambertProjection; 2],
        extinction: &'a X,
        diagnostics: &'a DiagnosticLog,
    ) -> Self {
        Self {
            params,
            model,
            beams,
            projections,
            extinction,
            diagnostics,
        }
    }

    pub fn npixels(&self) -> u64 {
        self.beams.len() as u64
    }

    fn fresh_walker(&self, ctx: &LaneContext) -> LaneWalker {
        LaneWalker::new(
            self.params.shape,
            self.npixels(),
            self.params.block_size,
            ctx.global_lane_index(),
            ctx.active_lanes,
        )
    }

    /// Recompute the per-diagonal cache for the cell under `cursor`.
    fn refresh(&self, walk: &mut Walk<M::State>, beam: &PencilBeam, cursor: &DiagonalCursor) {
        let p = self.params;
        let dist_mod = p.apparent_mag(cursor.im) - p.absolute_mag(cursor.i_abs);
        let distance = distance_pc(dist_mod);
        if p.outside_distance_limits(distance) {
            walk.cache = CellCache {
                distance,
                excluded: true,
                ..CellCache::default()
            };
            return;
        }
        let position = beam.direction.xyz(distance, p.sun_distance);
        self.model.setpos(&mut walk.model_state, position);
        walk.cache = CellCache {
            distance,
            extinction: self.extinction.along_beam(beam, dist_mod),
            position,
            excluded: false,
        };
    }

    /// Step to the next cell and evaluate it.
    #[inline]
    fn visit(&self, walk: &mut Walk<M::State>) -> Visit {
        let Some(moved) = walk.walker.step() else {
            return Visit::Done;
        };
        let cursor = *walk.walker.cursor();
        let beam = &self.beams[cursor.pixel as usize];
        if moved {
            self.refresh(walk, beam, &cursor);
        }
        if walk.cache.excluded {
            return Visit::Skipped;
        }

        let p = self.params;
        if p.apparent_mag(cursor.im) + walk.cache.extinction > p.m1 {
            return Visit::Skipped;
        }
        let d = walk.cache.distance;
        let rho = self.model.density(&walk.model_state, p.absolute_mag(cursor.i_abs))
            * p.norm
            * d
            * d
            * d
            * beam.d_a
            * POGSON
            * p.dm
            * p.d_abs_mag;
        Visit::Cell(rho)
    }

    /// Counting pass body: integrate the expected number of stars over the
    /// lane's cells.
    pub fn count(&self, ctx: &LaneContext, lane: &mut CountLane) -> Result<()> {
        let mut walk = Walk {
            walker: self.fresh_walker(ctx),
            cache: CellCache::default(),
            model_state: M::State::default(),
        };
        loop {
            match self.visit(&mut walk) {
                Visit::Done => break,
                Visit::Skipped => continue,
                Visit::Cell(rho) => {
                    let pixel = walk.walker.cursor().pixel;
                    let coverage = self.beams[pixel as usize].coverage;
                    lane.record(pixel, rho, coverage, self.params.histogram.as_ref());
                }
            }
        }
        Ok(())
    }

    /// Drawing pass body: draw stars into `sink`, resuming from and saving
    /// back to the lane's checkpoint.
    pub fn draw<K: StarSink>(&self, ctx: &LaneContext, lane: &mut DrawLane<'_, M::State>, sink: &K) -> Result<()> {
        let checkpoint = &mut *lane.checkpoint;
        let walker = match checkpoint.status {
            LaneStatus::Finished => return Ok(()),
            LaneStatus::Fresh => self.fresh_walker(ctx),
            LaneStatus::Suspended => LaneWalker::resume(
                self.params.shape,
                self.npixels(),
                self.params.block_size,
                ctx.active_lanes,
                checkpoint.position,
            ),
        };
        let mut walk = Walk {
            walker,
            cache: checkpoint.cache,
            model_state: checkpoint.model_state,
        };
        let mut rng = LaneRng::load(&*lane.rng, ctx.global_lane_index())?;
        let mut pending = checkpoint.pending;

        if pending > 0 {
            self.draw_stars(ctx, &walk, &mut rng, &mut pending, sink);
        }
        while pending == 0 {
            match self.visit(&mut walk) {
                Visit::Done => break,
                Visit::Skipped => continue,
                Visit::Cell(rho) => {
                    pending = rng.poisson(rho);
                    self.draw_stars(ctx, &walk, &mut rng, &mut pending, sink);
                }
            }
        }

        *checkpoint = LaneCheckpoint {
            status: if walk.walker.is_finished() {
                LaneStatus::Finished
            } else {
                LaneStatus::Suspended
            },
            position: walk.walker.position(),
            cache: walk.cache,
            model_state: walk.model_state,
            pending,
        };
        rng.store(&mut *lane.rng);
        Ok(())
    }

    /// Write as many of the `pending` draws of the current cell as the sink
    /// has room for.
    fn draw_stars<K: StarSink>(
        &self,
        ctx: &LaneContext,
        walk: &Walk<M::State>,
        rng: &mut LaneRng,
        pending: &mut u64,
        sink: &K,
    ) {
        if *pending == 0 {
            return;
        }
        let capacity = sink.capacity();
        let mut slot = sink.reserve(*pending as usize);
        while *pending > 0 && slot < capacity {
            let star = self.draw_star(ctx, walk, rng);
            sink.write(slot, &star);
            slot += 1;
            *pending -= 1;
        }
    }

    fn draw_star(&self, ctx: &LaneContext, walk: &Walk<M::State>, rng: &mut LaneRng) -> StarRecord {
        let p = self.params;
        let cursor = walk.walker.cursor();
        let beam = &self.beams[cursor.pixel as usize];

        let x = beam.x + beam.dx * (f64::from(rng.uniform()) - 0.5);
        let y = beam.y + beam.dx * (f64::from(rng.uniform()) - 0.5);
        if x * x + y * y > HEMISPHERE_R2 {
            return StarRecord::off_projection(beam.proj_idx, x as f32, y as f32);
        }

        let projection = &self.projections[(beam.proj_idx as usize).min(1)];
        let (l, b) = projection.deproject(x, y);
        let abs_mag = p.absolute_mag(cursor.i_abs) + p.d_abs_mag * (f64::from(rng.uniform()) - 0.5);
        let app_mag = p.m0 + p.dm * (f64::from(cursor.im) + f64::from(rng.uniform()) - 0.5);
        let dist_mod = app_mag - abs_mag;
        let position = Direction::new(l, b).xyz(distance_pc(dist_mod), p.sun_distance);
        let comp = self.model.component(&walk.model_state, position, abs_mag, rng);

        let am = self.extinction.sample(beam.proj_idx, x, y, dist_mod);
        let asymptote = self.extinction.sample(beam.proj_idx, x, y, DM_INFINITY);
        if asymptote < am {
            self.diagnostics.push(Diagnostic {
                lane: ctx.global_lane_index(),
                pixel: cursor.pixel,
                kind: DiagnosticKind::AsymptoteUndershoot {
                    star_am: am,
                    asymptote_am: asymptote,
                    proj_idx: beam.proj_idx,
                    x,
                    y,
                    dist_mod,
                },
            });
        }

        let mut l_deg = l.to_degrees();
        if l_deg >= 360.0 {
            l_deg -= 360.0;
        }
        StarRecord {
            proj_idx: beam.proj_idx,
            proj_x: x as f32,
            proj_y: y as f32,
            l: l_deg,
            b: b.to_degrees(),
            abs_mag: abs_mag as f32,
            dist_mod: dist_mod as f32,
            xyz: position.as_vec3().to_array(),
            comp,
            am: am as f32,
            am_inf: asymptote.max(am) as f32,
            hidden: app_mag + am > p.m1,
        }
    }
}

// ================================================================================================
// Tests
// ================================================================================================
