//! Publish metrics.
//!
//! - Graph requests by operation and status
//! - Terminal publish outcomes by platform and state
//! - Publish attempts per finished job

use metrics::{counter, histogram};

use reel_models::PublishJob;

/// Metric name constants for consistency.
pub mod names {
    /// Total Graph API requests by operation and status.
    pub const GRAPH_REQUESTS_TOTAL: &str = "reel_graph_requests_total";

    /// Graph API request latency in seconds by operation.
    pub const GRAPH_LATENCY_SECONDS: &str = "reel_graph_latency_seconds";

    /// Terminal publish jobs by platform and state.
    pub const REEL_PUBLISH_TOTAL: &str = "reel_publish_total";

    /// Publish attempts spent per finished job, by platform.
    pub const REEL_PUBLISH_ATTEMPTS: &str = "reel_publish_attempts";
}

/// Record metrics for a completed Graph request.
pub fn record_request(operation: &str, status: u16, latency_secs: f64) {
    counter!(
        names::GRAPH_REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::GRAPH_LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_secs);
}

/// Record the terminal outcome of a publish job.
pub fn record_outcome(job: &PublishJob) {
    counter!(
        names::REEL_PUBLISH_TOTAL,
        "platform" => job.platform.as_str(),
        "state" => job.state.as_str()
    )
    .increment(1);

    histogram!(
        names::REEL_PUBLISH_ATTEMPTS,
        "platform" => job.platform.as_str()
    )
    .record(f64::from(job.publish_attempts));
}
