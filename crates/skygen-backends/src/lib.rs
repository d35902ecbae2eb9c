//! Memory residency and lane execution for the skygen sampler
//!
//! This crate provides:
//! - **DualResidencyHandle**: reference-counted arrays living on the host, a
//!   device, or both, with lazy allocation and explicit sync
//! - **MemoryRegistry**: the process-wide sweep used to reclaim device memory
//!   when an allocation fails
//! - **LaneHarness**: one capability, "run this body across N lanes", with a
//!   deterministic host backend and a parallel backend
//! - **Launch planning**: grid shapes sized against a per-group scratch budget
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 per-lane sampler body                    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ LaneContext + &mut lane state
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌──────────────┐          ┌──────────────┐
//!   │    Host      │          │   Parallel   │──► DeviceArena
//!   │  sequential  │          │ (host/device)│
//!   └──────────────┘          └──────────────┘
//!          │                         │
//!          └──────────┬──────────────┘
//!                     ▼
//!      DualResidencyHandle<T>  ◄── MemoryRegistry::global_gc()
//! ```
//!
//! # Usage
//!
//! ```rust
//! use skygen_backends::{
//!     plan_launch, BackendError, DualResidencyHandle, Extent, HostSequentialHarness, LaneHarness,
//!     LaunchRequest, Side,
//! };
//!
//! # fn main() -> Result<(), BackendError> {
//! let values = DualResidencyHandle::<u64>::new(Extent::d1(1000), None);
//! let config = plan_launch(&LaunchRequest::new(1000)).expect("one lane fits");
//!
//! let mut lanes = values.write_on(Side::Host)?;
//! HostSequentialHarness::new().launch::<_, BackendError, _>(&config, &mut lanes[..], |ctx, slot| {
//!     *slot = ctx.global_lane_index() * 3;
//!     Ok(())
//! })?;
//! drop(lanes);
//!
//! assert_eq!(values.to_vec()?[10], 30);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;
pub mod memory;

pub use backend::{
    plan_launch, BlockDim, GridDim, LaneContext, LaneHarness, LaunchConfig, LaunchRequest, LaunchStats,
    ScratchConfig, Side, MAX_GRID_EXTENT,
};
pub use backends::{HostSequentialHarness, ParallelHarness};
pub use error::{BackendError, Result};
pub use memory::{
    ArrayBinding, ArrayFormat, BoundArray, DeviceArena, DualResidencyHandle, Element, Extent, FilterMode, GcOutcome,
    GcReport, MemoryRegistry,
};
