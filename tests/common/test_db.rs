//! Test database utilities for integration tests.
//!
//! Each [`TestDatabase`] is a file-backed SQLite database in its own temporary
//! directory, migrated on creation and removed when dropped.

#![allow(clippy::duplicate_mod)]

use std::path::PathBuf;
use strongbox::config::DatabaseConfig;
use strongbox::storage::{create_pool, Database};
use tempfile::TempDir;

/// A migrated SQLite database that is deleted on drop.
pub struct TestDatabase {
    pub database: Database,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database with migrations applied.
    pub async fn new(prefix: &str) -> Self {
        Self::with_options(prefix, true).await
    }

    /// Create a new test database without running migrations.
    pub async fn new_without_migrations(prefix: &str) -> Self {
        Self::with_options(prefix, false).await
    }

    pub async fn with_options(prefix: &str, run_migrations: bool) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(&format!("strongbox_{}_", prefix))
            .tempdir()
            .expect("create test database directory");
        let path = dir.path().join("test.db");

        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 5,
            min_connections: 0,
            auto_migrate: run_migrations,
            ..Default::default()
        };

        let database = create_pool(&config).await.expect("create test database pool");

        Self { database, path, _dir: dir }
    }

    /// Get a handle to the database.
    pub fn database(&self) -> Database {
        self.database.clone()
    }

    /// Get the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creates_file() {
        let db = TestDatabase::new("test_creates_file").await;
        assert!(db.path().exists(), "Database file should exist");

        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(db.database.pool())
            .await
            .expect("query should succeed");
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn test_database_cleanup_on_drop() {
        let path = {
            let db = TestDatabase::new("test_cleanup").await;
            db.database.close().await;
            db.path.clone()
        };
        assert!(!path.exists(), "Database file should be removed after drop");
    }
}
