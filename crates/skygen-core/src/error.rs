//! Error types for the sampler

use skygen_backends::BackendError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkygenError>;

#[derive(Error, Debug)]
pub enum SkygenError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{lanes} lanes requested but the stream pool holds only {streams} random streams")]
    StreamPoolExhausted { lanes: usize, streams: usize },

    #[error("random stream of lane {lane} is not seeded (multiplier {multiplier}, carry {carry})")]
    InvalidStream { lane: u64, multiplier: u32, carry: u32 },

    #[error("{continuing} lanes still have draws pending but the sink accepted none")]
    SinkStalled { continuing: usize },

    #[error("no launch shape fits {lanes} lanes with {per_lane} scratch bytes each in a {budget}-byte budget")]
    LaunchShape { lanes: u64, per_lane: usize, budget: usize },

    #[error("footprint is empty")]
    EmptyFootprint,

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
