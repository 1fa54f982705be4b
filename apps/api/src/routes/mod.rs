pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::artifacts::handlers as artifacts;
use crate::pipeline::handlers as pipeline;
use crate::state::AppState;

/// CV uploads are small PDFs, but larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Task state
        .route("/api/v1/pipeline", get(pipeline::handle_snapshot))
        .route("/api/v1/pipeline/reset", post(pipeline::handle_reset))
        // Stage invocation
        .route("/api/v1/stages/ingest", post(pipeline::handle_ingest))
        .route("/api/v1/stages/convert-cv", post(pipeline::handle_convert_cv))
        .route("/api/v1/stages/:stage", post(pipeline::handle_stage))
        // Files
        .route(
            "/api/v1/uploads",
            post(artifacts::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/artifacts/:name", get(artifacts::handle_download))
        .route(
            "/api/v1/artifacts/:name/preview",
            get(artifacts::handle_preview),
        )
        .with_state(state)
}
