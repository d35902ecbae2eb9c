//! Harness implementations

pub mod parallel;
pub mod sequential;

pub use parallel::ParallelHarness;
pub use sequential::HostSequentialHarness;
