//! Provider-to-core lifecycle callbacks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::router::AppState;

/// Header carrying the provider-level base64 body signature.
pub const PROVIDER_SIGNATURE_HEADER: &str = "x-provider-signature";

/// What the provider is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallbackEvent {
    /// Dispatch accepted; the job is queued on the cluster.
    Provisioned,
    ProvisionFailed,
    /// First successful start.
    Started,
    Completed,
    Failed,
    TerminateSucceeded,
    TerminateFailed,
}

/// One lifecycle callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleCallback {
    pub job_id: String,
    pub event: CallbackEvent,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /api/v1/callbacks/lifecycle`
pub async fn lifecycle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(PROVIDER_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::forbidden("missing-signature", "X-Provider-Signature header required")
        })?;
    state
        .provider_key
        .verify_base64(&body, signature)
        .map_err(|_| ApiError::forbidden("invalid-signature", "provider signature did not verify"))?;

    let callback: LifecycleCallback = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("malformed-body", e.to_string()))?;
    let reason = callback.reason.clone().unwrap_or_default();

    let outcome = match callback.event {
        CallbackEvent::Provisioned => state.lifecycle.acknowledge_dispatch(&callback.job_id).await,
        CallbackEvent::Started => state.lifecycle.report_started(&callback.job_id).await,
        CallbackEvent::Completed => {
            state
                .lifecycle
                .report_completed(&callback.job_id, callback.exit_code.unwrap_or(0))
                .await
        }
        CallbackEvent::ProvisionFailed | CallbackEvent::Failed => {
            let reason = if reason.is_empty() {
                "provider reported failure".to_string()
            } else {
                reason
            };
            state.lifecycle.report_failed(&callback.job_id, &reason).await
        }
        CallbackEvent::TerminateSucceeded => {
            info!(job_id = %callback.job_id, "Provider confirmed termination");
            return Ok(Json(json!({ "status": "acknowledged" })));
        }
        CallbackEvent::TerminateFailed => {
            warn!(job_id = %callback.job_id, %reason, "Provider failed to terminate work");
            return Ok(Json(json!({ "status": "acknowledged" })));
        }
    };

    match outcome {
        Ok(()) => Ok(Json(json!({ "status": "applied" }))),
        Err(e) => {
            // Callbacks that cannot be reconciled are logged and dropped.
            warn!(job_id = %callback.job_id, error = %e, "Unreconcilable callback");
            Err(ApiError::from_classified(&e))
        }
    }
}
