//! # Storage and Persistence
//!
//! SQLite-backed lease store: dynamic secrets, leases and the append-only
//! lease event log.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, pending_migrations, MigrationInfo,
};
pub use pool::{create_pool, DbPool};
pub use repositories::{
    DynamicSecretRepository, LeaseEventRepository, LeaseRepository, LeaseTransition,
    SqlxDynamicSecretRepository, SqlxLeaseEventRepository, SqlxLeaseRepository,
};

use crate::errors::{LeaseError, Result};

/// SQLite result codes for busy and locked databases, including extended codes
const TRANSIENT_SQLITE_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| LeaseError::storage(e, "Database connectivity check failed"))?;

    Ok(())
}

/// Whether a sqlx error is worth retrying: pool exhaustion, I/O, busy or locked database
pub fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| TRANSIENT_SQLITE_CODES.contains(&code.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}
