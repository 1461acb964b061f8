//! # queuectl-database
//!
//! SQLite connection management, embedded migrations, and the two
//! repositories that make up the shared store: the job table with its
//! atomic claim and transition primitives, and the worker pool registry.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod time;

pub use connection::DatabasePool;
pub use repositories::{JobRepository, Transition, WorkerPoolRepository};
