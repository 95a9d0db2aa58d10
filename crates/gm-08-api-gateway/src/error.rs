//! HTTP error translation.
//!
//! Every component error carries a taxonomy class; this module maps classes
//! onto the wire uniformly:
//!
//! - validation / policy  -> 4xx with a stable machine code and message
//! - transient            -> 503 with `Retry-After`
//! - state-conflict       -> 200 referencing the existing record
//! - fatal                -> 500 with a correlation id, plus a component
//!   shutdown signal to the runtime

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shared_types::{Classified, ErrorClass};
use uuid::Uuid;

/// A translated API error.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub class: ErrorClass,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Wrap any classified component error.
    pub fn from_classified<E: Classified + std::fmt::Display>(err: &E) -> Self {
        Self {
            class: err.class(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// A plain bad-request error for malformed input.
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Validation,
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// A policy (authorization) error.
    pub fn forbidden(code: &str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Policy,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.class {
            ErrorClass::Validation => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": self.code, "message": self.message })),
            )
                .into_response(),
            ErrorClass::Policy => (
                StatusCode::FORBIDDEN,
                Json(json!({ "code": self.code, "message": self.message })),
            )
                .into_response(),
            // Duplicate effects never happen; answer success-shaped with a
            // reference to what already exists.
            ErrorClass::StateConflict => (
                StatusCode::OK,
                Json(json!({
                    "status": "exists",
                    "code": self.code,
                    "message": self.message,
                })),
            )
                .into_response(),
            ErrorClass::Transient => {
                let correlation_id = Uuid::new_v4().to_string();
                tracing::warn!(
                    correlation_id = %correlation_id,
                    code = %self.code,
                    message = %self.message,
                    "Transient error surfaced over HTTP"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "5")],
                    Json(json!({
                        "code": self.code,
                        "message": self.message,
                        "correlationId": correlation_id,
                    })),
                )
                    .into_response()
            }
            ErrorClass::Fatal => {
                let correlation_id = Uuid::new_v4().to_string();
                tracing::error!(
                    correlation_id = %correlation_id,
                    code = %self.code,
                    message = %self.message,
                    "Fatal component error surfaced over HTTP"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "correlationId": correlation_id })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_01_node_aggregator::AggregatorError;

    #[test]
    fn test_validation_maps_to_400() {
        let api = ApiError::from_classified(&AggregatorError::UnknownNode("n1".into()));
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conflict_maps_to_200() {
        let api =
            ApiError::from_classified(&AggregatorError::SequenceReplay { got: 1, last: 2 });
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_policy_maps_to_403() {
        let api = ApiError::forbidden("provider-mismatch", "not the cluster owner");
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_transient_maps_to_503_with_retry_after() {
        let api = ApiError {
            class: ErrorClass::Transient,
            code: "store-io".into(),
            message: "journal write failed".into(),
        };
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "5");
    }

    #[test]
    fn test_fatal_maps_to_500() {
        let api = ApiError::from_classified(&AggregatorError::CorruptKey("n1".into()));
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
