//! Repository implementations for queuectl tables.

pub mod job;
pub mod worker_pool;

pub use job::{JobRepository, Transition};
pub use worker_pool::WorkerPoolRepository;
