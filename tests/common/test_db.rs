//! Test database utilities for integration tests.
//!
//! Each test gets its own file-backed SQLite database inside a temporary
//! directory, so WAL mode and multi-connection pools behave as in production.

#![allow(clippy::duplicate_mod)]

use leasekeeper::config::DatabaseConfig;
use leasekeeper::storage::{create_pool, DbPool};
use std::path::PathBuf;
use tempfile::TempDir;

/// A migrated test database removed when dropped
pub struct TestDatabase {
    pub pool: DbPool,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database with migrations applied
    pub async fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(&format!("leasekeeper-{}-", prefix))
            .tempdir()
            .expect("create temporary directory");
        let path = dir.path().join("leases.db");

        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 5,
            auto_migrate: true,
            ..Default::default()
        };
        let pool = create_pool(&config).await.expect("create test database pool");

        Self { pool, path, _dir: dir }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creates_file() {
        let db = TestDatabase::new("creates-file").await;
        assert!(db.path.exists(), "Database file should exist");

        let result: (i64,) =
            sqlx::query_as("SELECT 1").fetch_one(&db.pool).await.expect("query should succeed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_database_removed_on_drop() {
        let path = {
            let db = TestDatabase::new("cleanup").await;
            db.pool.close().await;
            db.path.clone()
        };
        assert!(!path.exists(), "Database file should be removed after drop");
    }
}
