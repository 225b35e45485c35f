//! # Metrics Collection
//!
//! Store metrics recorded through the `metrics` facade. Installing an exporter
//! (Prometheus or otherwise) is up to the embedding process; without one the
//! calls are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::sync::Once;
use std::time::Duration;

pub const OPERATIONS_TOTAL: &str = "strongbox_store_operations_total";
pub const OPERATION_DURATION_SECONDS: &str = "strongbox_store_operation_duration_seconds";
pub const KEEPER_CALLS_TOTAL: &str = "strongbox_keeper_calls_total";

static DESCRIBE: Once = Once::new();

/// Records store operation outcomes and latencies
#[derive(Debug, Clone)]
pub struct StoreMetrics {
    enabled: bool,
}

impl StoreMetrics {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            DESCRIBE.call_once(register_store_metrics);
        }
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one store operation with its outcome label (`ok` or an error kind)
    pub fn record_operation(&self, operation: &'static str, outcome: &str, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!(OPERATIONS_TOTAL, &labels).increment(1);

        let duration_labels = [("operation", operation.to_string())];
        histogram!(OPERATION_DURATION_SECONDS, &duration_labels).record(elapsed.as_secs_f64());
    }

    /// Record an encode/decode call against a keeper
    pub fn record_keeper_call(&self, keeper: &str, operation: &'static str, success: bool) {
        if !self.enabled {
            return;
        }
        let status = if success { "success" } else { "error" };
        let labels = [
            ("keeper", keeper.to_string()),
            ("operation", operation.to_string()),
            ("status", status.to_string()),
        ];
        counter!(KEEPER_CALLS_TOTAL, &labels).increment(1);
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::disabled()
    }
}

fn register_store_metrics() {
    describe_counter!(
        OPERATIONS_TOTAL,
        Unit::Count,
        "Secure value store operations by operation and outcome"
    );
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        Unit::Seconds,
        "Secure value store operation latency"
    );
    describe_counter!(KEEPER_CALLS_TOTAL, Unit::Count, "Keeper encode/decode calls by status");
}
