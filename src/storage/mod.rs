//! # Storage and Persistence
//!
//! Database connectivity and schema management for the secure value store.
//! SQLite and PostgreSQL are both served through sqlx's `Any` driver.

pub mod migrations;
pub mod pool;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations, validate_migrations,
    MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, install_drivers, Database, DbPool, PoolStats};

use crate::errors::{Result, StrongboxError};

/// Table holding the current state of every secure value
pub const SECURE_VALUE_TABLE: &str = "secure_value";

/// Append-only audit trail of secure value mutations
pub const HISTORY_TABLE: &str = "secure_value_history";

/// Check database connectivity
pub async fn check_connection(database: &Database) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(database.pool())
        .await
        .map_err(|e| StrongboxError::database(e, "Database connectivity check failed"))?;

    Ok(())
}
