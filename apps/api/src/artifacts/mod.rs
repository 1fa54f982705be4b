//! Artifact Store: a flat directory of named files handed from stage to stage.
//!
//! Existence is the only contract: no hashing, no versioning, no locking.
//! Concurrent writers are ruled out by the orchestrator's single-flight gate.

pub mod handlers;
pub mod preview;
pub mod records;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::types::{PipelineError, StageId};

pub use records::PostingRecord;

/// Logical names of the pipeline's durable outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactName {
    RawPostings,
    RewrittenPostings,
    ConvertedCv,
    SynthesizedCv,
    EmbeddingMatches,
    RerankMatches,
    Explanations,
}

impl ArtifactName {
    pub const ALL: [ArtifactName; 7] = [
        ArtifactName::RawPostings,
        ArtifactName::RewrittenPostings,
        ArtifactName::ConvertedCv,
        ArtifactName::SynthesizedCv,
        ArtifactName::EmbeddingMatches,
        ArtifactName::RerankMatches,
        ArtifactName::Explanations,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactName::RawPostings => "jobs_raw.json",
            ArtifactName::RewrittenPostings => "jobs_rewritten.json",
            ArtifactName::ConvertedCv => "cv_converted.txt",
            ArtifactName::SynthesizedCv => "cv_synthesized.txt",
            ArtifactName::EmbeddingMatches => "matches_embedding.json",
            ArtifactName::RerankMatches => "matches_rerank.json",
            ArtifactName::Explanations => "explained_matches.json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactName::RawPostings => "Raw postings",
            ArtifactName::RewrittenPostings => "Rewritten postings",
            ArtifactName::ConvertedCv => "Converted CV text",
            ArtifactName::SynthesizedCv => "Synthesized CV",
            ArtifactName::EmbeddingMatches => "Embedding matches",
            ArtifactName::RerankMatches => "Rerank matches",
            ArtifactName::Explanations => "Explanations",
        }
    }

    /// The stage whose successful run writes this artifact.
    pub fn producer(self) -> StageId {
        match self {
            ArtifactName::RawPostings => StageId::Ingest,
            ArtifactName::RewrittenPostings => StageId::RewriteJobs,
            ArtifactName::ConvertedCv => StageId::ConvertCv,
            ArtifactName::SynthesizedCv => StageId::RewriteCv,
            ArtifactName::EmbeddingMatches => StageId::EmbedMatch,
            ArtifactName::RerankMatches => StageId::RerankMatch,
            ArtifactName::Explanations => StageId::Explain,
        }
    }

    /// Tabular artifacts hold `PostingRecord` rows; the others are plain text.
    pub fn is_tabular(self) -> bool {
        !matches!(self, ArtifactName::ConvertedCv | ArtifactName::SynthesizedCv)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.file_name())
    }
}

impl FromStr for ArtifactName {
    type Err = String;

    /// Accepts the file name (`jobs_raw.json`), the snake name
    /// (`raw_postings`) or the URL form (`raw-postings`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        ArtifactName::ALL
            .into_iter()
            .find(|name| {
                name.file_name() == wanted
                    || serde_json::to_value(name)
                        .ok()
                        .and_then(|v| v.as_str().map(|n| n == wanted))
                        .unwrap_or(false)
            })
            .ok_or_else(|| format!("Unknown artifact '{s}'"))
    }
}

/// Returns the name unchanged if it is a plain file name safe to join onto
/// the artifact directory (no separators, no `..`, not hidden).
pub fn safe_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(&['/', '\\', '\0'][..])
        && Path::new(name).file_name().and_then(|f| f.to_str()) == Some(name);
    plain.then_some(name)
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path(&self, name: ArtifactName) -> PathBuf {
        self.root.join(name.file_name())
    }

    /// Synchronous on purpose: called inside the tracker's critical section.
    pub fn exists(&self, name: ArtifactName) -> bool {
        self.path(name).is_file()
    }

    /// Path for a user-supplied file name (uploads, downloads), or `None` if
    /// the name could escape the directory.
    pub fn file_path(&self, file_name: &str) -> Option<PathBuf> {
        safe_file_name(file_name).map(|name| self.root.join(name))
    }

    pub async fn read_text(&self, name: ArtifactName) -> Result<String, PipelineError> {
        let path = self.path(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::external(&format!("Reading {name}"), e))
    }

    pub async fn write_text(&self, name: ArtifactName, content: &str) -> Result<PathBuf, PipelineError> {
        let path = self.path(name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| PipelineError::external(&format!("Writing {name}"), e))?;
        debug!(artifact = name.file_name(), bytes = content.len(), "Artifact written");
        Ok(path)
    }

    pub async fn read_records(&self, name: ArtifactName) -> Result<Vec<PostingRecord>, PipelineError> {
        let raw = self.read_text(name).await?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::MalformedOutput(format!("{name} is not a record list: {e}")))
    }

    pub async fn write_records(
        &self,
        name: ArtifactName,
        records: &[PostingRecord],
    ) -> Result<PathBuf, PipelineError> {
        let json = serde_json::to_string_pretty(records)?;
        self.write_text(name, &json).await
    }
}
