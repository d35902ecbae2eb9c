//! Host/device memory: arenas, layouts, dual-residency handles and the
//! registry used for reactive garbage collection.

pub mod array;
pub mod device;
pub mod handle;
pub mod layout;
pub mod registry;

pub use array::{AddressMode, ArrayFormat, BoundArray, FilterMode};
pub use device::{DeviceArena, DeviceBuffer, DeviceReservation, DeviceStats};
pub use handle::{ArrayBinding, DualResidencyHandle, Element};
pub use layout::{Extent, Layout, PITCH_ALIGN};
pub use registry::{GcOutcome, GcReport, MemoryRegistry};
