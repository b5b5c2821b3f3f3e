//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Secret admin request counters
//! - `/metrics` rendering (stream session metrics come from `livewatch_stream::metrics`)

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded. Concurrent callers
/// wait for the first one. Returns `false` if already initialized.
pub fn init_metrics() -> bool {
    let mut initialized = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        }
        describe_metrics();
        tracing::info!("Prometheus metrics initialized");
        initialized = true;
        handle
    });
    initialized
}

fn describe_metrics() {
    livewatch_stream::metrics::describe();
    describe_counter!(
        "livewatch_secret_requests_total",
        "Secret admin operations by action and outcome"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record one secret admin operation.
///
/// * `action` - "list", "read", "write" or "delete"
/// * `outcome` - "ok", "not_found", "rejected" or "unavailable"
pub fn record_secret_request(action: &'static str, outcome: &'static str) {
    counter!("livewatch_secret_requests_total", "action" => action, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder() {
        // No recorder installed: recording is a no-op and must not panic.
        record_secret_request("list", "ok");
    }

    #[test]
    fn test_init_metrics_once() {
        let first = init_metrics();
        let second = init_metrics();
        assert!(!second || !first);
        if first {
            assert!(render_metrics().is_some());
        }
    }
}
