//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary and applied in filename order.
//! Each applied migration is recorded with a checksum so edits to an already
//! applied file are detected.

use crate::errors::{LeaseError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{error, info, warn};

/// Embedded migrations as `(filename, sql)`, sorted by version prefix
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250101000001_create_dynamic_secrets",
        include_str!("../../migrations/20250101000001_create_dynamic_secrets.sql"),
    ),
    (
        "20250101000002_create_dynamic_secret_leases",
        include_str!("../../migrations/20250101000002_create_dynamic_secret_leases.sql"),
    ),
    (
        "20250101000003_create_dynamic_secret_lease_events",
        include_str!("../../migrations/20250101000003_create_dynamic_secret_lease_events.sql"),
    ),
];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub execution_time: i64,
    pub checksum: Vec<u8>,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    create_migration_table(pool).await?;
    let applied = list_applied_migrations(pool).await?;

    let mut migrations_run = 0;
    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;
        let checksum = calculate_checksum(sql);

        if let Some(existing) = applied.iter().find(|m| m.version == version) {
            if existing.checksum != checksum {
                warn!(version = version, "Applied migration differs from embedded copy: {}", filename);
            }
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to start migration transaction"))?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            LeaseError::storage(e, format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;

        sqlx::query(
            "INSERT INTO _leasekeeper_migrations (version, description, checksum, execution_time, installed_on) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(version)
        .bind(*filename)
        .bind(&checksum)
        .bind(execution_time)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, migration = filename, "Failed to record migration");
            LeaseError::storage(e, format!("Failed to record migration: {}", filename))
        })?;

        tx.commit()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to commit migration transaction"))?;

        migrations_run += 1;
        info!(version = version, execution_time_ms = execution_time, "Migration completed: {}", filename);
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _leasekeeper_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum BLOB NOT NULL,
            execution_time INTEGER NOT NULL,
            installed_on TEXT NOT NULL
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LeaseError::storage(e, "Failed to create migration tracking table"))?;

    Ok(())
}

fn extract_version_from_filename(filename: &str) -> Result<i64> {
    let version_str = filename
        .split('_')
        .next()
        .ok_or_else(|| LeaseError::validation(format!("Invalid migration filename: {}", filename)))?;

    version_str
        .parse::<i64>()
        .map_err(|_| LeaseError::validation(format!("Invalid version in filename: {}", filename)))
}

fn calculate_checksum(content: &str) -> Vec<u8> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish().to_le_bytes().to_vec()
}

/// Highest applied migration version, or 0 on a fresh database
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = list_applied_migrations(pool).await?;
    Ok(applied.into_iter().map(|m| m.version).max().unwrap_or(0))
}

/// Number of embedded migrations not yet applied
pub async fn pending_migrations(pool: &DbPool) -> Result<usize> {
    let applied = list_applied_migrations(pool).await?;
    let mut pending = 0;
    for (filename, _) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;
        if !applied.iter().any(|m| m.version == version) {
            pending += 1;
        }
    }
    Ok(pending)
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    create_migration_table(pool).await?;

    let rows = sqlx::query(
        "SELECT version, description, checksum, execution_time, installed_on FROM _leasekeeper_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| LeaseError::storage(e, "Failed to list applied migrations"))?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationInfo {
            version: row.get("version"),
            description: row.get("description"),
            installed_on: row.get("installed_on"),
            execution_time: row.get("execution_time"),
            checksum: row.get("checksum"),
        })
        .collect())
}
