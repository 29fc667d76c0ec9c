//! Timeline error types.

use rewind_delta::DeltaError;
use rewind_world::WorldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("chunk timeline not found")]
    NotFound,

    #[error("timeline has no time points")]
    EmptyTimeline,

    #[error("time point {index} out of range (last is {max})")]
    OutOfRange { index: u32, max: u32 },

    #[error("global header is broken: got {got} bytes for barriers and limit, expected 12")]
    BarrierHeaderCorrupt { got: usize },

    #[error("database is closed")]
    DatabaseClosed,

    #[error("store: {0}")]
    Kv(String),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    World(#[from] WorldError),
}
