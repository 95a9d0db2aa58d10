//! Route table and shared state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gm_01_node_aggregator::NodeAggregator;
use gm_04_job_lifecycle::JobLifecycleEngine;
use shared_crypto::Ed25519PublicKey;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// State shared by every handler.
pub struct AppState {
    pub aggregator: Arc<NodeAggregator>,
    pub lifecycle: Arc<JobLifecycleEngine>,
    /// Provider key authenticating lifecycle callbacks.
    pub provider_key: Ed25519PublicKey,
}

/// Build the gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/hpc/nodes/register", post(handlers::nodes::register))
        .route(
            "/api/v1/hpc/nodes/:node_id/heartbeat",
            post(handlers::nodes::heartbeat),
        )
        .route(
            "/api/v1/hpc/nodes/:node_id/metrics",
            post(handlers::nodes::metrics_batch),
        )
        .route("/api/v1/hpc/jobs", post(handlers::jobs::submit))
        .route("/api/v1/hpc/jobs/:job_id", get(handlers::jobs::query))
        .route(
            "/api/v1/callbacks/lifecycle",
            post(handlers::callbacks::lifecycle),
        )
        .route("/metrics", get(handlers::metrics_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
