//! Customer job endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use shared_types::Job;

use gm_04_job_lifecycle::JobSubmission;

use crate::error::ApiError;
use crate::router::AppState;

/// `POST /api/v1/hpc/jobs`
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<JobSubmission>,
) -> Result<Json<Job>, ApiError> {
    if submission.resources.nodes == 0 {
        return Err(ApiError::bad_request(
            "invalid-demand",
            "a job must demand at least one node",
        ));
    }
    let job = state
        .lifecycle
        .submit(submission)
        .await
        .map_err(|e| ApiError::from_classified(&e))?;
    Ok(Json(job))
}

/// `GET /api/v1/hpc/jobs/{jobId}`
pub async fn query(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state
        .lifecycle
        .job(&job_id)
        .ok_or_else(|| ApiError::bad_request("unknown-job", format!("unknown job: {job_id}")))?;
    Ok(Json(json!({
        "job": job,
        "auditTrail": state
            .lifecycle
            .audit_log()
            .into_iter()
            .filter(|r| r.job_id == job_id)
            .collect::<Vec<_>>(),
    })))
}
