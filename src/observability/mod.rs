//! # Observability
//!
//! Structured logging and store metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::StoreMetrics;

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Initialize logging and return the metrics handle the store should use
pub fn init_observability(config: &ObservabilityConfig) -> Result<StoreMetrics> {
    init_logging(config)?;

    let metrics = StoreMetrics::new(config.enable_metrics);

    tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(metrics)
}
