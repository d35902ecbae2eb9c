//! Error types for memory and launch operations

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised by memory handles and lane harnesses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Device allocation failed even after garbage collection
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory { requested: usize, available: usize },

    /// A device-side operation was requested on a handle with no device
    #[error("no device attached to handle {0}")]
    NoDevice(u64),

    /// Launch shape does not fit the scratch budget
    #[error("scratch budget exceeded: {static_bytes}B static + {per_lane}B per lane > {budget}B per group")]
    ScratchBudgetExceeded {
        per_lane: usize,
        static_bytes: usize,
        budget: usize,
    },

    /// Launch configuration is malformed
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// More lane states were supplied than the grid can run
    #[error("{lanes} lanes requested but launch shape only holds {capacity}")]
    LaneCapacityExceeded { lanes: usize, capacity: u64 },

    /// Supplied data does not match the handle's extent
    #[error("extent mismatch: expected {expected} elements, got {actual}")]
    ExtentMismatch { expected: usize, actual: usize },

    /// Worker pool could not be constructed
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}
