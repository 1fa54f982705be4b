use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::artifacts::{preview, ArtifactName, ArtifactStore};
use crate::errors::AppError;
use crate::pipeline::types::PipelineError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub bytes: usize,
}

/// POST /api/v1/uploads
/// Saves the first file field of the form into the artifact directory.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        let response = save_upload(&state.store, &file_name, data).await?;
        return Ok((StatusCode::CREATED, Json(response)));
    }
    Err(AppError::Validation("No file in upload".into()))
}

async fn save_upload(
    store: &ArtifactStore,
    file_name: &str,
    data: Bytes,
) -> Result<UploadResponse, AppError> {
    let path = store
        .file_path(file_name)
        .ok_or_else(|| AppError::Validation(format!("Invalid file name '{file_name}'")))?;
    if ArtifactName::ALL
        .iter()
        .any(|a| a.file_name() == file_name.trim())
    {
        return Err(AppError::Validation(format!(
            "'{file_name}' is reserved for pipeline output"
        )));
    }
    if data.is_empty() {
        return Err(AppError::Validation(format!("'{file_name}' is empty")));
    }

    store.ensure_root().await.map_err(PipelineError::from)?;
    tokio::fs::write(&path, &data)
        .await
        .map_err(PipelineError::from)?;
    info!(file = file_name, bytes = data.len(), "Upload saved");

    Ok(UploadResponse {
        filename: file_name.to_string(),
        bytes: data.len(),
    })
}

/// GET /api/v1/artifacts/:name
/// `name` is an artifact name (`raw-postings`) or any file name in the
/// artifact directory.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let file_name = name
        .parse::<ArtifactName>()
        .map(|a| a.file_name().to_string())
        .unwrap_or(name);
    let path = state
        .store
        .file_path(&file_name)
        .ok_or_else(|| AppError::Validation(format!("Invalid file name '{file_name}'")))?;

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("{file_name} not found")));
        }
        Err(e) => return Err(PipelineError::from(e).into()),
    };

    let headers = [
        (header::CONTENT_TYPE, content_type(&file_name).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ),
    ];
    Ok((headers, data).into_response())
}

/// GET /api/v1/artifacts/:name/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let artifact: ArtifactName = name.parse().map_err(AppError::NotFound)?;
    if !state.store.exists(artifact) {
        return Err(AppError::NotFound(format!("{artifact} not found")));
    }
    Ok(Json(preview::preview(&state.store, artifact).await?))
}

fn content_type(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "txt" => "text/plain; charset=utf-8",
        Some(ext) if ext == "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
