//! Database migration runner.

use sqlx::SqlitePool;
use tracing::debug;

use queuectl_core::error::{AppError, ErrorKind};

/// Run all pending database migrations. Safe to call from every process
/// on startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    debug!("Running database migrations...");

    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::StoreUnavailable,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    debug!("Database migrations completed");
    Ok(())
}
