//! API-level errors and their JSON response bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PipelineError;

/// Structured error response body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        (status, Json(body)).into_response()
    }
}

/// Client-caused pipeline failures keep their message and surface as 400s;
/// everything else becomes a 500 whose detail stays server-side.
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => ApiError::BadRequest(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn bad_request_passes_detail_to_client() {
        let (status, json) =
            response_parts(ApiError::BadRequest("At least one text is required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "At least one text is required");
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let (status, json) =
            response_parts(ApiError::Internal("qdrant unreachable at 10.0.0.3".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn validation_errors_map_to_bad_request() {
        let err = ApiError::from(PipelineError::Validation(
            "Documents list cannot be empty".into(),
        ));
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "Documents list cannot be empty");
    }

    #[tokio::test]
    async fn other_pipeline_errors_map_to_internal() {
        let err = ApiError::from(PipelineError::Wiring(
            "query pipeline produced no replies".into(),
        ));
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "INTERNAL");
    }
}
