//! Shared helpers for repository integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use queuectl_core::config::DatabaseConfig;
use queuectl_database::DatabasePool;
use queuectl_entity::job::NewJob;

/// A throwaway on-disk database. The directory is removed on drop.
pub struct TestDb {
    pub db: DatabasePool,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("queue.db").display()),
            max_connections: 16,
            busy_timeout_ms: 10_000,
        };
        let db = DatabasePool::connect(&config).await.expect("connect");
        Self { db, _dir: dir }
    }

    pub fn pool(&self) -> sqlx::SqlitePool {
        self.db.pool().clone()
    }
}

/// Fixed reference instant so ordering assertions are deterministic.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

pub fn new_job(id: &str, command: &str, max_retries: u32, created_at: DateTime<Utc>) -> NewJob {
    NewJob {
        id: id.to_string(),
        command: command.to_string(),
        max_retries,
        created_at,
    }
}

/// Stale cutoff far enough in the past that nothing is reclaimed.
pub fn never_stale() -> DateTime<Utc> {
    t0() - Duration::days(365)
}
