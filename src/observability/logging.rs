//! # Structured Logging
//!
//! Subscriber setup plus span macros used by the store and storage layers.
//!
//! `RUST_LOG` takes precedence over the configured log level. In JSON mode each
//! event carries the fields of its current span, so `namespace`/`name` recorded
//! by `#[instrument]` on store operations show up on every nested event.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Result, StrongboxError};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for database operations.
///
/// ```rust,ignore
/// let span = db_span!("insert_secure_value", namespace = "org-1");
/// ```
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            namespace = tracing::field::Empty
        )
    };
    ($operation:expr, namespace = $ns:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            namespace = %$ns
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            namespace = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for keeper (encryption backend) calls
#[macro_export]
macro_rules! keeper_span {
    ($operation:expr, $keeper:expr) => {
        tracing::debug_span!(
            "keeper_operation",
            operation = %$operation,
            keeper = %$keeper
        )
    };
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// Fails if the log level is not a valid filter directive or a subscriber is
/// already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            StrongboxError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let installed = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    installed.map_err(|e| StrongboxError::config(format!("Failed to initialize logging: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    let database_type = if config.database.is_sqlite() { "sqlite" } else { "postgresql" };
    tracing::info!(
        database_type = database_type,
        default_keeper = %config.keeper.default_keeper,
        local_keys = config.keeper.local_keys.len(),
        vault_enabled = config.keeper.vault.is_some(),
        history_page_size = config.store.history_page_size,
        metrics_enabled = config.observability.enable_metrics,
        "Strongbox configuration"
    );
}
