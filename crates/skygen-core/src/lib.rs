//! Resumable parallel Monte Carlo sampler for synthetic star catalogs
//!
//! The sampler integrates a stellar density model over a survey footprint
//! discretized into pencil beams, apparent magnitude bins and absolute
//! magnitude bins, then draws a Poisson realization of stars into a bounded
//! output table.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SkyGenerator (host)                                          │
//! │   integrate_counts ─► calibrate norm ─► draw launches        │
//! └──────────────┬───────────────────────────────────────────────┘
//!                │ LaneHarness::launch
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Sampler (per lane)                                           │
//! │   LaneWalker ─► cell cache ─► DensityModel ─► LaneRng        │
//! │        │                         │              │            │
//! │   LaneCheckpoint          ExtinctionField    StarSink        │
//! └──────────────────────────────────────────────────────────────┘
//!                │
//!                ▼
//!   DualResidencyHandle: pixels, checkpoints, random streams,
//!   extinction grids (skygen-backends)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use skygen_core::{Footprint, Homogeneous, NoExtinction, SkyGenerator, SkygenConfig, StarTable};
//! use skygen_backends::HostSequentialHarness;
//!
//! # fn main() -> skygen_core::Result<()> {
//! let config = SkygenConfig {
//!     m0: 16.0,
//!     m1: 18.0,
//!     lanes: 8,
//!     streams: 8,
//!     target_count: Some(50.0),
//!     ..SkygenConfig::default()
//! };
//! let footprint = Footprint::polar_cap(0, 0.05, 0.02, None)?;
//! let harness = HostSequentialHarness::new();
//! let mut generator = SkyGenerator::new(config, Homogeneous::new(1e-3), footprint, NoExtinction, harness)?;
//!
//! let sink = StarTable::with_capacity(1000);
//! let mut catalog = Vec::new();
//! let (counts, draws) = generator.run(&sink, |sink| {
//!     catalog.extend(sink.drain());
//!     Ok(())
//! })?;
//!
//! assert!(counts.norm > 0.0);
//! assert_eq!(catalog.len(), draws.stars_written);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extinction;
pub mod host;
pub mod model;
pub mod pixel;
pub mod rng;
pub mod sampler;
pub mod sink;
pub mod traversal;

pub use checkpoint::{CellCache, CheckpointStore, LaneCheckpoint, LaneStatus};
pub use config::{HistogramConfig, SkygenConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use error::{Result, SkygenError};
pub use extinction::{
    Axis, BeamExtinctionTable, BoundExtinction, ExtinctionField, ExtinctionGrid, ExtinctionMaps, ExtinctionSource,
    NoExtinction, DM_INFINITY,
};
pub use host::{CountSummary, DrawSummary, LaunchOutcome, SkyGenerator};
pub use model::{DensityModel, Homogeneous};
pub use pixel::{Direction, Footprint, LambertProjection, PencilBeam};
pub use rng::{LaneRng, MwcState, StreamPool};
pub use sampler::{distance_pc, CountLane, DrawLane, Sampler, SamplerParams, POGSON};
pub use sink::{StarRecord, StarSink, StarTable};
pub use traversal::{DiagonalCursor, GridShape, LaneWalker, WalkPosition};
