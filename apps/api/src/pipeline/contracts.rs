//! Stage artifact contracts: the files each stage needs on disk before it
//! may start, the file it writes, and the message for a missing input.
//!
//! Resolution runs inside the tracker's critical section, so a stage either
//! starts with every input present or never reaches RUNNING.

use std::path::PathBuf;

use crate::artifacts::{ArtifactName, ArtifactStore};
use crate::pipeline::types::{PipelineError, StageId};
use crate::stages::StageRequest;

/// Candidate "matches" artifacts, most preferred first.
pub const MATCH_CANDIDATES: &[ArtifactName] =
    &[ArtifactName::RerankMatches, ArtifactName::EmbeddingMatches];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// This exact artifact must exist.
    Artifact(ArtifactName),
    /// The first existing artifact of the list is used.
    FirstOf(&'static [ArtifactName]),
    /// The file named in the request must have been uploaded.
    UploadedDocument,
}

#[derive(Debug, Clone, Copy)]
pub struct StageContract {
    pub stage: StageId,
    pub requires: &'static [Requirement],
    pub produces: ArtifactName,
}

pub const CONTRACTS: [StageContract; 7] = [
    StageContract {
        stage: StageId::Ingest,
        requires: &[],
        produces: ArtifactName::RawPostings,
    },
    StageContract {
        stage: StageId::RewriteJobs,
        requires: &[Requirement::Artifact(ArtifactName::RawPostings)],
        produces: ArtifactName::RewrittenPostings,
    },
    StageContract {
        stage: StageId::ConvertCv,
        requires: &[Requirement::UploadedDocument],
        produces: ArtifactName::ConvertedCv,
    },
    StageContract {
        stage: StageId::RewriteCv,
        requires: &[Requirement::Artifact(ArtifactName::ConvertedCv)],
        produces: ArtifactName::SynthesizedCv,
    },
    StageContract {
        stage: StageId::EmbedMatch,
        requires: &[
            Requirement::Artifact(ArtifactName::SynthesizedCv),
            Requirement::Artifact(ArtifactName::RewrittenPostings),
        ],
        produces: ArtifactName::EmbeddingMatches,
    },
    StageContract {
        stage: StageId::RerankMatch,
        requires: &[
            Requirement::Artifact(ArtifactName::SynthesizedCv),
            Requirement::Artifact(ArtifactName::RewrittenPostings),
        ],
        produces: ArtifactName::RerankMatches,
    },
    StageContract {
        stage: StageId::Explain,
        requires: &[
            Requirement::FirstOf(MATCH_CANDIDATES),
            Requirement::Artifact(ArtifactName::SynthesizedCv),
        ],
        produces: ArtifactName::Explanations,
    },
];

pub fn contract(stage: StageId) -> &'static StageContract {
    // CONTRACTS is indexed in StageId declaration order.
    &CONTRACTS[StageId::ALL
        .iter()
        .position(|s| *s == stage)
        .unwrap_or_default()]
}

/// Inputs a stage was cleared to run with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    /// One entry per artifact requirement, in contract order.
    pub artifacts: Vec<ArtifactName>,
    pub document: Option<PathBuf>,
}

impl ResolvedInputs {
    /// The matches artifact picked for a `FirstOf(MATCH_CANDIDATES)` requirement.
    pub fn matches(&self) -> Option<ArtifactName> {
        self.artifacts
            .iter()
            .copied()
            .find(|a| MATCH_CANDIDATES.contains(a))
    }
}

/// Checks every requirement of the request's stage, in contract order, and
/// fails on the first one not met.
pub fn resolve(request: &StageRequest, store: &ArtifactStore) -> Result<ResolvedInputs, PipelineError> {
    let stage = request.stage();
    let mut resolved = ResolvedInputs::default();

    for requirement in contract(stage).requires {
        match *requirement {
            Requirement::Artifact(name) => {
                if !store.exists(name) {
                    return Err(missing_artifact(stage, name));
                }
                resolved.artifacts.push(name);
            }
            Requirement::FirstOf(candidates) => {
                let found = first_existing(store, candidates)
                    .ok_or_else(|| missing_any(stage, candidates))?;
                resolved.artifacts.push(found);
            }
            Requirement::UploadedDocument => {
                let file_name = request.document_name().unwrap_or_default();
                let path = store
                    .file_path(file_name)
                    .filter(|p| p.is_file())
                    .ok_or_else(|| missing_document(stage, file_name))?;
                resolved.document = Some(path);
            }
        }
    }

    Ok(resolved)
}

/// Deterministic preference: the first candidate present on disk.
pub fn first_existing(store: &ArtifactStore, candidates: &[ArtifactName]) -> Option<ArtifactName> {
    candidates.iter().copied().find(|name| store.exists(*name))
}

fn missing_artifact(stage: StageId, name: ArtifactName) -> PipelineError {
    PipelineError::MissingArtifact {
        stage,
        artifact: name.file_name().to_string(),
        message: format!(
            "{name} not found. Run the {} stage first.",
            name.producer()
        ),
    }
}

fn missing_any(stage: StageId, candidates: &[ArtifactName]) -> PipelineError {
    let files: Vec<_> = candidates.iter().map(|c| c.file_name()).collect();
    let producers: Vec<_> = candidates.iter().map(|c| c.producer().to_string()).collect();
    PipelineError::MissingArtifact {
        stage,
        artifact: files.join(" | "),
        message: format!(
            "No matches file found ({}). Run the {} stage first.",
            files.join(" or "),
            producers.join(" or ")
        ),
    }
}

fn missing_document(stage: StageId, file_name: &str) -> PipelineError {
    PipelineError::MissingArtifact {
        stage,
        artifact: file_name.to_string(),
        message: format!("Uploaded document '{file_name}' not found. Upload a CV first."),
    }
}
