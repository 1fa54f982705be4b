use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::types::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Pipeline(err) => match err {
                PipelineError::Busy { .. } => (StatusCode::CONFLICT, "BUSY", err.to_string()),
                PipelineError::MissingArtifact { .. } => (
                    StatusCode::PRECONDITION_FAILED,
                    "MISSING_ARTIFACT",
                    err.to_string(),
                ),
                PipelineError::MalformedOutput(msg) => {
                    tracing::error!("Malformed artifact: {msg}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "MALFORMED_ARTIFACT",
                        err.to_string(),
                    )
                }
                PipelineError::ExternalFailure(msg) => {
                    tracing::error!("External failure: {msg}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "EXTERNAL_FAILURE",
                        "A storage or upstream error occurred".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::StageId;

    #[test]
    fn test_missing_artifact_is_precondition_failed() {
        let err = AppError::from(PipelineError::MissingArtifact {
            stage: StageId::Explain,
            artifact: "matches_rerank.json".into(),
            message: "No matches file found".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn test_validation_is_bad_request() {
        let response = AppError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_external_failure_hides_details() {
        let err = AppError::from(PipelineError::ExternalFailure("disk on fire".into()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
