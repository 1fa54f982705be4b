use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::LlmError;

/// The seven pipeline stages, in pipeline order. Order is informative only;
/// any stage may be invoked at any time as long as its inputs exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Ingest,
    RewriteJobs,
    ConvertCv,
    RewriteCv,
    EmbedMatch,
    RerankMatch,
    Explain,
}

impl StageId {
    pub const ALL: [StageId; 7] = [
        StageId::Ingest,
        StageId::RewriteJobs,
        StageId::ConvertCv,
        StageId::RewriteCv,
        StageId::EmbedMatch,
        StageId::RerankMatch,
        StageId::Explain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Ingest => "ingest",
            StageId::RewriteJobs => "rewrite_jobs",
            StageId::ConvertCv => "convert_cv",
            StageId::RewriteCv => "rewrite_cv",
            StageId::EmbedMatch => "embed_match",
            StageId::RerankMatch => "rerank_match",
            StageId::Explain => "explain",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    /// Accepts both `rewrite_jobs` and the URL form `rewrite-jobs`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| format!("Unknown stage '{s}'"))
    }
}

/// Lifecycle of the current task.
///
/// IDLE → RUNNING → COMPLETED | ERROR, and any state → IDLE on reset.
/// A missing input artifact goes IDLE/terminal → ERROR without RUNNING.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Error)
    }
}

/// Pipeline failure taxonomy.
///
/// `Busy` and `MissingArtifact` are raised before a task starts and go back to
/// the invoker. `ExternalFailure` and `MalformedOutput` happen inside a running
/// task and only ever surface as the ERROR state plus a final log line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Another task is already running ({running})")]
    Busy { running: StageId },

    #[error("{message}")]
    MissingArtifact {
        stage: StageId,
        artifact: String,
        message: String,
    },

    #[error("External failure: {0}")]
    ExternalFailure(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),
}

impl PipelineError {
    pub fn external(context: &str, err: impl fmt::Display) -> Self {
        PipelineError::ExternalFailure(format!("{context}: {err}"))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::ExternalFailure(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::MalformedOutput(err.to_string())
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Parse(_) | LlmError::EmptyContent | LlmError::Shape(_) => {
                PipelineError::MalformedOutput(err.to_string())
            }
            other => PipelineError::ExternalFailure(other.to_string()),
        }
    }
}
