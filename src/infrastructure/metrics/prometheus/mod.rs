mod counters;
mod prometheus_metrics;
mod recorder;

pub use prometheus_metrics::PrometheusMetrics;
use std::sync::Arc;

pub(crate) use counters::{increment_ceremony, increment_claim, track_http_request};
pub(crate) use recorder::{init_metrics, render_metrics};

/// Creates a new Prometheus metrics implementation.
///
/// Installs the global recorder on first use; `/metrics` renders whatever
/// it has collected.
pub fn create() -> anyhow::Result<crate::domain::MetricsPtr> {
    tracing::info!("Initializing Prometheus metrics");
    init_metrics()?;

    Ok(Arc::new(PrometheusMetrics::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_repeatable_and_renders_counters() {
        // ---
        let metrics = create().unwrap();
        let again = create().unwrap();

        metrics.record_ceremony("registration", "verified");
        again.record_claim("invite");

        let rendered = metrics.render();
        assert!(rendered.contains("passkey_ceremonies_total"));
        assert!(rendered.contains("entitlement_claims_total"));
    }
}
