//! # Database Connection Pool Management
//!
//! One `AnyPool` serves both SQLite and PostgreSQL; the dialect is taken from
//! the URL and travels with the pool as [`Database`].

use crate::config::DatabaseConfig;
use crate::errors::{Result, StrongboxError};
use crate::sqltemplate::Dialect;
use sqlx::any::AnyPoolOptions;
use std::sync::Once;

/// Type alias for the database connection pool
pub type DbPool = sqlx::AnyPool;

static INSTALL_DRIVERS: Once = Once::new();

/// Register the SQLite and PostgreSQL drivers with sqlx's `Any` driver
pub fn install_drivers() {
    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// A connection pool plus the dialect it speaks
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    dialect: Dialect,
}

impl Database {
    pub fn new(pool: DbPool, dialect: Dialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<Database> {
    validate_config(config)?;
    let dialect = config.dialect()?;
    install_drivers();

    let pool_options = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true);

    let pool_options = if let Some(idle_timeout) = config.idle_timeout() {
        pool_options.idle_timeout(idle_timeout)
    } else {
        pool_options
    };

    let pool = pool_options.connect(&config.url).await.map_err(|e| {
        tracing::error!(
            error = %e,
            url = %sanitize_url(&config.url),
            "Failed to create database pool"
        );
        StrongboxError::database(
            e,
            format!("Failed to connect to database: {}", sanitize_url(&config.url)),
        )
    })?;

    if dialect == Dialect::Sqlite && !config.url.contains(":memory:") {
        // journal mode is persisted in the database file
        sqlx::raw_sql("PRAGMA journal_mode = WAL").execute(&pool).await.map_err(|e| {
            StrongboxError::database(e, "Failed to enable SQLite WAL journal mode")
        })?;
    }

    tracing::info!(
        database_type = dialect.name(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis(),
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    let database = Database::new(pool, dialect);

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&database).await?;
    }

    Ok(database)
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(StrongboxError::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(StrongboxError::validation(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if config.url.is_empty() {
        return Err(StrongboxError::validation("database URL cannot be empty"));
    }

    Dialect::from_url(&config.url)?;

    Ok(())
}

/// Sanitize database URL for logging (remove credentials)
pub(crate) fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            format!(
                "{}://***:***@{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}

/// Get pool statistics for monitoring
pub fn get_pool_stats(pool: &DbPool) -> PoolStats {
    PoolStats { size: pool.size(), idle: pool.num_idle() }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    /// Get the number of active connections
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }

    /// Check if the pool is healthy (has available connections)
    pub fn is_healthy(&self) -> bool {
        self.size > 0
    }
}
