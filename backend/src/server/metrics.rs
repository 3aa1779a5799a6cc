//! Optional Prometheus metrics middleware.

use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};

/// Request metrics exposed at `/metrics`.
pub(crate) fn build_metrics() -> std::io::Result<PrometheusMetrics> {
    PrometheusMetricsBuilder::new("platelist")
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(format!("prometheus metrics setup failed: {e}")))
}
