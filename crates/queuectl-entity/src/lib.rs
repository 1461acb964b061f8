//! # queuectl-entity
//!
//! Domain models for queuectl. [`job::Job`] is the queue record, the
//! `worker` module holds supervisor snapshots and the cross-process pool
//! registry row. Entities derive `Debug`, `Clone`, `Serialize`, and
//! `Deserialize`; persistence mapping lives in `queuectl-database`.

pub mod job;
pub mod worker;

pub use job::{EnqueueRequest, Job, JobState, NewJob, QueueStats};
pub use worker::{WorkerPoolRecord, WorkerStatus};
