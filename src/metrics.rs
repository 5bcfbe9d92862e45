//! Prometheus metrics for startup, queries and upstream fetches.
//!
//! This module provides metrics for:
//! - Connection gate probe attempts
//! - Migrations applied and failed
//! - Query serialization latency and failures
//! - Upstream schedule fetches
//! - HTTP request latency per endpoint

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, warn};

// === Metric Name Constants ===

/// Database probe attempts counter metric name.
pub const METRIC_DB_PROBE_ATTEMPTS: &str = "db_probe_attempts_total";
/// Migrations applied counter metric name.
pub const METRIC_MIGRATIONS_APPLIED: &str = "migrations_applied_total";
/// Migrations failed counter metric name.
pub const METRIC_MIGRATIONS_FAILED: &str = "migrations_failed_total";
/// Query latency metric name.
pub const METRIC_QUERY_LATENCY: &str = "query_latency_ms";
/// Query failures counter metric name.
pub const METRIC_QUERY_FAILURES: &str = "query_failures_total";
/// Upstream fetch latency metric name.
pub const METRIC_UPSTREAM_FETCH_LATENCY: &str = "upstream_fetch_latency_ms";
/// Upstream fetch failures counter metric name.
pub const METRIC_UPSTREAM_FETCH_FAILURES: &str = "upstream_fetch_failures_total";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup, after installing a recorder.
pub fn init_metrics() {
    describe_histogram!(METRIC_QUERY_LATENCY, "Query to JSON latency in milliseconds");
    describe_histogram!(
        METRIC_UPSTREAM_FETCH_LATENCY,
        "Upstream schedule fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );

    describe_counter!(
        METRIC_DB_PROBE_ATTEMPTS,
        "Total number of database connectivity probes"
    );
    describe_counter!(METRIC_MIGRATIONS_APPLIED, "Total number of migrations applied");
    describe_counter!(METRIC_MIGRATIONS_FAILED, "Total number of migrations that failed");
    describe_counter!(METRIC_QUERY_FAILURES, "Total number of failed query serializations");
    describe_counter!(
        METRIC_UPSTREAM_FETCH_FAILURES,
        "Total number of failed upstream schedule fetches"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder.
///
/// Returns `None` if a recorder is already installed.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
}

/// Record query latency.
pub fn record_query_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_QUERY_LATENCY).record(latency_ms);
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint).record(latency_ms);
}

/// Increment database probe counter.
pub fn inc_db_probe_attempts() {
    counter!(METRIC_DB_PROBE_ATTEMPTS).increment(1);
}

/// Increment migrations applied counter.
pub fn inc_migrations_applied() {
    counter!(METRIC_MIGRATIONS_APPLIED).increment(1);
}

/// Increment migrations failed counter.
pub fn inc_migrations_failed() {
    counter!(METRIC_MIGRATIONS_FAILED).increment(1);
}

/// Increment query failures counter.
pub fn inc_query_failures() {
    counter!(METRIC_QUERY_FAILURES).increment(1);
}

/// Increment upstream fetch failures counter.
pub fn inc_upstream_fetch_failures() {
    counter!(METRIC_UPSTREAM_FETCH_FAILURES).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for upstream fetches.
pub fn timer_upstream_fetch() -> LatencyTimer {
    LatencyTimer::new(METRIC_UPSTREAM_FETCH_LATENCY)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static RECORDER: Lazy<PrometheusHandle> = Lazy::new(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("no other recorder in tests")
    });

    /// Process-wide recorder shared by tests that inspect rendered metrics.
    pub(crate) fn test_recorder() -> PrometheusHandle {
        RECORDER.clone()
    }
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_upstream_fetch();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }
}
