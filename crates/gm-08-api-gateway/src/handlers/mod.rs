//! HTTP handlers.

pub mod callbacks;
pub mod jobs;
pub mod nodes;


use axum::http::StatusCode;

/// Prometheus exposition endpoint.
pub async fn metrics_text() -> Result<String, StatusCode> {
    grid_telemetry::gather().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
