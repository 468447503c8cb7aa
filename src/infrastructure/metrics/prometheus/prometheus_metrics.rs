//! Prometheus metrics implementation.
//!
//! Delegates to the sibling `counters` and `recorder` modules, which talk to
//! the global `metrics` crate registry. A single global handle renders
//! everything collected in Prometheus text format.

use crate::domain::Metrics;
use std::time::Instant;

/// Prometheus-based metrics implementation.
///
/// Carries no state of its own: counters and histograms live in the global
/// registry and the render handle lives in `recorder.rs`.
#[derive(Default)]
pub struct PrometheusMetrics {}

impl PrometheusMetrics {
    pub fn new() -> Self {
        tracing::info!("Creating Prometheus metrics");
        PrometheusMetrics {}
    }
}

impl Metrics for PrometheusMetrics {
    // ---
    fn render(&self) -> String {
        super::render_metrics()
    }

    fn record_ceremony(&self, ceremony: &'static str, outcome: &'static str) {
        tracing::debug!("Recording {} ceremony: {}", ceremony, outcome);
        super::increment_ceremony(ceremony, outcome);
    }

    fn record_claim(&self, source_type: &'static str) {
        tracing::debug!("Recording {} claim", source_type);
        super::increment_claim(source_type);
    }

    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16) {
        super::track_http_request(start, path, method, status);
    }
}
