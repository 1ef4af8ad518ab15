//! Prometheus metrics for rift-mock-server.
//!
//! Tracks dispatched requests, WebSocket session lifecycle and CRUD store activity.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total number of requests answered
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mock_requests_total",
        "Total number of requests answered by the mock server",
        &["dispatcher", "status"]  // dispatcher: mock|crud|custom
    )
    .unwrap();

    /// WebSocket session lifecycle events
    pub static ref WEBSOCKET_SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        "mock_websocket_sessions_total",
        "WebSocket session lifecycle events",
        &["event"]  // event: created|opened|closed|unexpected|failed
    )
    .unwrap();

    /// CRUD store operations
    pub static ref CRUD_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "mock_crud_operations_total",
        "Total number of CRUD store operations",
        &["verb", "result"]  // result: ok|not_found|error|unsupported
    )
    .unwrap();

    /// Time spent inside a dispatcher
    pub static ref DISPATCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mock_dispatch_duration_ms",
        "Histogram of dispatch time in milliseconds",
        &["dispatcher"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record an answered request
pub fn record_request(dispatcher: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[dispatcher, &status.to_string()])
        .inc();
}

pub fn record_websocket_event(event: &str) {
    WEBSOCKET_SESSIONS_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_crud_operation(verb: &str, result: &str) {
    CRUD_OPERATIONS_TOTAL
        .with_label_values(&[verb, result])
        .inc();
}

/// Helper to record dispatch duration
pub fn record_dispatch_duration(dispatcher: &str, duration_ms: f64) {
    DISPATCH_DURATION_MS
        .with_label_values(&[dispatcher])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("mock", 200);
        record_request("crud", 404);
        record_dispatch_duration("mock", 0.3);

        let metrics = collect_metrics();
        assert!(metrics.contains("mock_requests_total"));
        assert!(metrics.contains("mock_dispatch_duration_ms"));
    }

    #[test]
    fn test_websocket_and_crud_metrics() {
        record_websocket_event("opened");
        record_websocket_event("closed");
        record_crud_operation("POST", "ok");
        record_crud_operation("PATCH", "error");

        let metrics = collect_metrics();
        assert!(metrics.contains("mock_websocket_sessions_total"));
        assert!(metrics.contains("mock_crud_operations_total"));
    }
}
