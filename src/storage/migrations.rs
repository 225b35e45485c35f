//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary, one set per dialect, and
//! applied in version order. Each applied migration is recorded with a SHA-256
//! checksum; an applied migration whose embedded text later changes is
//! reported as an error instead of being silently skipped.

use crate::errors::{Result, StrongboxError};
use crate::sqltemplate::Dialect;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{error, info, warn};

const MIGRATIONS_TABLE: &str = "_strongbox_migrations";

const SQLITE_MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250101000001_create_secure_value",
        include_str!("../../migrations/sqlite/20250101000001_create_secure_value.sql"),
    ),
    (
        "20250101000002_create_secure_value_history",
        include_str!("../../migrations/sqlite/20250101000002_create_secure_value_history.sql"),
    ),
];

const POSTGRES_MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250101000001_create_secure_value",
        include_str!("../../migrations/postgres/20250101000001_create_secure_value.sql"),
    ),
    (
        "20250101000002_create_secure_value_history",
        include_str!("../../migrations/postgres/20250101000002_create_secure_value_history.sql"),
    ),
];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time: i64,
    pub checksum: String,
}

/// Embedded migrations for a dialect, in version order
fn embedded_migrations(dialect: Dialect) -> &'static [(&'static str, &'static str)] {
    match dialect {
        Dialect::Sqlite => SQLITE_MIGRATIONS,
        Dialect::Postgres => POSTGRES_MIGRATIONS,
    }
}

/// Run all pending database migrations
pub async fn run_migrations(database: &Database) -> Result<()> {
    info!(dialect = %database.dialect(), "Starting database migration process");

    create_migration_table(database).await?;

    let applied = get_applied_checksums(database).await?;
    let dialect = database.dialect();

    let mut migrations_run = 0;
    for (filename, sql) in embedded_migrations(dialect) {
        let version = extract_version_from_filename(filename)?;
        let checksum = calculate_checksum(sql);

        if let Some(applied_checksum) = applied.get(&version) {
            if applied_checksum != &checksum {
                error!(version = version, migration = filename, "Applied migration was modified");
                return Err(StrongboxError::config(format!(
                    "Migration {} was modified after it was applied",
                    filename
                )));
            }
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = database
            .pool()
            .begin()
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to start migration transaction"))?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            StrongboxError::database(e, format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        let insert = format!(
            "INSERT INTO {} (version, description, checksum, execution_time, installed_on) \
             VALUES ({}, {}, {}, {}, {})",
            MIGRATIONS_TABLE,
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3),
            dialect.placeholder(4),
            dialect.placeholder(5),
        );

        sqlx::query(&insert)
            .bind(version)
            .bind(*filename)
            .bind(checksum.as_str())
            .bind(execution_time)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, migration = filename, "Failed to record migration");
                StrongboxError::database(e, format!("Failed to record migration: {}", filename))
            })?;

        tx.commit()
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to commit migration transaction"))?;

        migrations_run += 1;
        info!(
            version = version,
            execution_time_ms = execution_time,
            "Migration completed: {}",
            filename
        );
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

/// Create the migration tracking table
async fn create_migration_table(database: &Database) -> Result<()> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            checksum TEXT NOT NULL,
            execution_time BIGINT NOT NULL,
            installed_on BIGINT NOT NULL
        )",
        MIGRATIONS_TABLE
    );

    sqlx::query(&ddl)
        .execute(database.pool())
        .await
        .map_err(|e| StrongboxError::database(e, "Failed to create migration tracking table"))?;

    Ok(())
}

async fn get_applied_checksums(database: &Database) -> Result<HashMap<i64, String>> {
    let rows = sqlx::query(&format!(
        "SELECT version, checksum FROM {} ORDER BY version",
        MIGRATIONS_TABLE
    ))
    .fetch_all(database.pool())
    .await
    .map_err(|e| StrongboxError::database(e, "Failed to get applied migrations"))?;

    rows.into_iter()
        .map(|row| {
            let version: i64 = row.try_get("version")?;
            let checksum: String = row.try_get("checksum")?;
            Ok((version, checksum))
        })
        .collect::<std::result::Result<HashMap<_, _>, sqlx::Error>>()
        .map_err(|e| StrongboxError::database(e, "Failed to decode applied migrations"))
}

/// Extract version number from migration filename
fn extract_version_from_filename(filename: &str) -> Result<i64> {
    let version_str = filename.split('_').next().ok_or_else(|| {
        StrongboxError::validation(format!("Invalid migration filename: {}", filename))
    })?;

    version_str.parse::<i64>().map_err(|_| {
        StrongboxError::validation(format!("Invalid version in filename: {}", filename))
    })
}

/// Calculate checksum for migration content
fn calculate_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Validate that exactly the embedded migrations are applied, unmodified
pub async fn validate_migrations(database: &Database) -> Result<bool> {
    info!("Validating migration integrity");

    create_migration_table(database).await?;
    let applied = get_applied_checksums(database).await?;
    let mut expected = HashMap::new();
    for (filename, sql) in embedded_migrations(database.dialect()) {
        expected.insert(extract_version_from_filename(filename)?, calculate_checksum(sql));
    }

    for (version, checksum) in &expected {
        match applied.get(version) {
            None => {
                warn!(version = version, "Missing migration");
                return Ok(false);
            }
            Some(found) if found != checksum => {
                warn!(version = version, "Migration checksum mismatch");
                return Ok(false);
            }
            Some(_) => {}
        }
    }

    for version in applied.keys() {
        if !expected.contains_key(version) {
            warn!(version = version, "Unexpected migration found");
            return Ok(false);
        }
    }

    info!("Migration validation successful");
    Ok(true)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(database: &Database) -> Result<i64> {
    create_migration_table(database).await?;
    let applied = get_applied_checksums(database).await?;
    Ok(applied.into_keys().max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(database: &Database) -> Result<Vec<MigrationInfo>> {
    create_migration_table(database).await?;
    let rows = sqlx::query(&format!(
        "SELECT version, description, checksum, execution_time, installed_on FROM {} \
         ORDER BY version",
        MIGRATIONS_TABLE
    ))
    .fetch_all(database.pool())
    .await
    .map_err(|e| StrongboxError::database(e, "Failed to list applied migrations"))?;

    rows.into_iter()
        .map(|row| {
            let installed_ms: i64 = row.try_get("installed_on")?;
            Ok(MigrationInfo {
                version: row.try_get("version")?,
                description: row.try_get("description")?,
                checksum: row.try_get("checksum")?,
                execution_time: row.try_get("execution_time")?,
                installed_on: DateTime::from_timestamp_millis(installed_ms).unwrap_or_default(),
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
        .map_err(|e| StrongboxError::database(e, "Failed to decode applied migrations"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_from_filename() {
        assert_eq!(
            extract_version_from_filename("20250101000001_create_secure_value").unwrap(),
            20250101000001
        );
        assert!(extract_version_from_filename("invalid_filename").is_err());
    }

    #[test]
    fn test_calculate_checksum() {
        let checksum1 = calculate_checksum("CREATE TABLE test (id INTEGER);");
        let checksum2 = calculate_checksum("CREATE TABLE test (id INTEGER);");
        let checksum3 = calculate_checksum("CREATE TABLE other (id INTEGER);");

        assert_eq!(checksum1, checksum2);
        assert_ne!(checksum1, checksum3);
        assert_eq!(checksum1.len(), 64);
    }

    #[test]
    fn test_dialect_sets_match() {
        let sqlite: Vec<&str> = SQLITE_MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let postgres: Vec<&str> = POSTGRES_MIGRATIONS.iter().map(|(name, _)| *name).collect();
        assert_eq!(sqlite, postgres);

        let mut sorted = sqlite.clone();
        sorted.sort();
        assert_eq!(sqlite, sorted, "migrations must be listed in version order");
    }
}
