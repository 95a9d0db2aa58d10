//! Node-agent endpoints.
//!
//! All of them authenticate with a signature over the raw request body: the
//! heartbeat carries its signature inline (over its canonical body), while
//! register and metrics submissions sign the HTTP body itself via the
//! `X-Signature` header.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use shared_crypto::Ed25519PublicKey;
use shared_types::{Heartbeat, MetricsRecord};
use tracing::warn;

use gm_01_node_aggregator::RegisterNodeRequest;

use crate::error::ApiError;
use crate::router::AppState;

/// Header carrying the base64 body signature for node-agent requests.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// `POST /api/v1/hpc/nodes/register`
///
/// The registration is self-signed: the body embeds the node's public key
/// and the signature must verify under it.
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: RegisterNodeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("malformed-body", e.to_string()))?;

    let key = Ed25519PublicKey::from_bytes(request.public_key)
        .map_err(|e| ApiError::bad_request("invalid-public-key", e.to_string()))?;
    verify_body_signature(&headers, &body, &key)?;

    let node_id = request.node_id.clone();
    state
        .aggregator
        .register_node(request)
        .await
        .map_err(|e| ApiError::from_classified(&e))?;
    Ok(Json(json!({ "status": "registered", "nodeId": node_id })))
}

/// `POST /api/v1/hpc/nodes/{nodeId}/heartbeat`
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<Value>, ApiError> {
    if heartbeat.node_id != node_id {
        return Err(ApiError::bad_request(
            "node-id-mismatch",
            format!("path says {node_id}, body says {}", heartbeat.node_id),
        ));
    }
    let sequence = heartbeat.sequence;
    state
        .aggregator
        .submit_heartbeat(heartbeat)
        .await
        .map_err(|e| ApiError::from_classified(&e))?;
    Ok(Json(json!({ "status": "accepted", "sequence": sequence })))
}

/// `POST /api/v1/hpc/nodes/{nodeId}/metrics`
pub async fn metrics_batch(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let node = state.aggregator.node(&node_id).ok_or_else(|| {
        warn!(node_id, "Metrics batch from unknown node dropped");
        ApiError::bad_request("unknown-node", format!("unknown node: {node_id}"))
    })?;
    let key = Ed25519PublicKey::from_bytes(node.public_key)
        .map_err(|e| ApiError::bad_request("invalid-public-key", e.to_string()))?;
    verify_body_signature(&headers, &body, &key)?;

    let records: Vec<MetricsRecord> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("malformed-body", e.to_string()))?;
    let outcome = state
        .aggregator
        .submit_metrics_batch(&node_id, records)
        .await
        .map_err(|e| ApiError::from_classified(&e))?;
    Ok(Json(json!({
        "accepted": outcome.accepted,
        "rejected": outcome.rejected,
    })))
}

/// Check the `X-Signature` header against the raw body bytes.
pub(crate) fn verify_body_signature(
    headers: &HeaderMap,
    body: &[u8],
    key: &Ed25519PublicKey,
) -> Result<(), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::forbidden("missing-signature", "X-Signature header required"))?;
    key.verify_base64(body, signature)
        .map_err(|_| ApiError::forbidden("invalid-signature", "body signature did not verify"))
}
