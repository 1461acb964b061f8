//! Job domain entities.

pub mod model;
pub mod state;
pub mod stats;

pub use model::{EnqueueRequest, Job, NewJob};
pub use state::JobState;
pub use stats::QueueStats;
