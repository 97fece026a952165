//! Prometheus metrics for monitoring identity server health.
//!
//! Metrics are exposed in Prometheus text format for scraping by monitoring systems.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts, duration, status codes
//! - **Auth Metrics**: Authentication outcomes per scheme and status
//! - **Session Metrics**: Sessions issued by login and by renewal
//! - **Notification Metrics**: Failed publications
//! - **Infrastructure Metrics**: Errors that are not caused by bad input
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use kw_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/session", 200);
//! ```

use keyward::StatusCode;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Errors
///
/// Returns a message when the exporter cannot be installed
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment authentication attempts counter.
pub fn auth_attempts_total(scheme: &str, status: StatusCode) {
    metrics::counter!("auth_attempts_total",
        "scheme" => scheme.to_string(),
        "status" => format!("{:?}", status)
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Increment issued sessions counter; `kind` is `login` or `renew`.
pub fn sessions_issued_total(kind: &'static str) {
    metrics::counter!("sessions_issued_total", "kind" => kind).increment(1);
}

// ============================================================================
// Notification Metrics
// ============================================================================

/// Record the dispatcher's running total of failed publications.
pub fn notification_failures(total: u64) {
    metrics::gauge!("notification_failures").set(total as f64);
}

// ============================================================================
// Infrastructure Metrics
// ============================================================================

/// Increment infrastructure error counter.
pub fn infrastructure_errors_total(operation: &str) {
    metrics::counter!("infrastructure_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}
