use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::artifacts::safe_file_name;
use crate::errors::AppError;
use crate::pipeline::tracker::TaskSnapshot;
use crate::pipeline::types::StageId;
use crate::pipeline::InvokeStatus;
use crate::stages::{IngestMode, StageRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConvertCvRequest {
    /// Name of a file previously sent to `/api/v1/uploads`.
    pub filename: String,
}

/// GET /api/v1/pipeline
pub async fn handle_snapshot(State(state): State<AppState>) -> Json<TaskSnapshot> {
    Json(state.orchestrator.snapshot())
}

/// POST /api/v1/pipeline/reset
pub async fn handle_reset(State(state): State<AppState>) -> Json<TaskSnapshot> {
    state.orchestrator.reset();
    Json(state.orchestrator.snapshot())
}

/// POST /api/v1/stages/ingest
pub async fn handle_ingest(
    State(state): State<AppState>,
    Json(mode): Json<IngestMode>,
) -> Result<(StatusCode, Json<InvokeStatus>), AppError> {
    mode.validate().map_err(AppError::Validation)?;
    invoke(&state, StageRequest::Ingest(mode))
}

/// POST /api/v1/stages/convert-cv
pub async fn handle_convert_cv(
    State(state): State<AppState>,
    Json(req): Json<ConvertCvRequest>,
) -> Result<(StatusCode, Json<InvokeStatus>), AppError> {
    let file_name = safe_file_name(&req.filename)
        .ok_or_else(|| AppError::Validation(format!("Invalid file name '{}'", req.filename)))?;
    invoke(
        &state,
        StageRequest::ConvertCv {
            file_name: file_name.to_string(),
        },
    )
}

/// POST /api/v1/stages/:stage
/// Stages that take no arguments.
pub async fn handle_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<(StatusCode, Json<InvokeStatus>), AppError> {
    let stage: StageId = stage.parse().map_err(AppError::NotFound)?;
    let request = StageRequest::without_args(stage).ok_or_else(|| {
        AppError::Validation(format!(
            "{stage} takes arguments; use /api/v1/stages/{}",
            stage.as_str().replace('_', "-")
        ))
    })?;
    invoke(&state, request)
}

/// 202 when started, 409 when another stage is running.
fn invoke(
    state: &AppState,
    request: StageRequest,
) -> Result<(StatusCode, Json<InvokeStatus>), AppError> {
    let status = state.orchestrator.invoke(request)?;
    let code = match status {
        InvokeStatus::Started { .. } => StatusCode::ACCEPTED,
        InvokeStatus::Busy { .. } => StatusCode::CONFLICT,
    };
    Ok((code, Json(status)))
}
