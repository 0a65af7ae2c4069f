//! Worker metrics and the Prometheus exporter.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Metric name constants for consistency.
pub mod names {
    /// Items handled per cycle, by outcome.
    pub const ITEMS_TOTAL: &str = "reel_items_total";

    /// Failed fetch cycles.
    pub const CYCLE_FAILURES_TOTAL: &str = "reel_cycle_failures_total";
}

/// Record the outcome of one item.
pub fn record_item(outcome: &'static str) {
    counter!(names::ITEMS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a cycle that could not fetch content.
pub fn record_cycle_failure() {
    counter!(names::CYCLE_FAILURES_TOTAL).increment(1);
}

/// Install the Prometheus recorder and serve it on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))?;
    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(names::ITEMS_TOTAL, "reel_items_total");
        assert!(names::CYCLE_FAILURES_TOTAL.starts_with("reel_"));
    }
}
