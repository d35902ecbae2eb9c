//! Harness interface and launch types

pub mod grid;
pub mod traits;
pub mod types;

pub use grid::{plan_launch, LaunchRequest, MAX_GRID_EXTENT};
pub use traits::{LaneHarness, LaunchStats};
pub use types::{BlockDim, GridDim, LaneContext, LaunchConfig, ScratchConfig, Side};
