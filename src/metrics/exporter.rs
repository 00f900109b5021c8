//! Prometheus metrics exporter
//!
//! The recorder is installed without its own listener; the text format is
//! served from the API router at `/metrics`.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Can only install once; later calls return the existing handle.
pub fn install_recorder() -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in the Prometheus text format
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),
}

/// Axum route serving the rendered metrics
pub fn metrics_route<S>() -> axum::routing::MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    use axum::response::IntoResponse;

    axum::routing::get(|| async {
        match render_metrics() {
            Some(metrics) => (
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                metrics,
            )
                .into_response(),
            None => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "Metrics not initialized",
            )
                .into_response(),
        }
    })
}
