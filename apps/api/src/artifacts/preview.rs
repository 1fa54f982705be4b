//! Artifact previews shown under each pipeline step in the UI.

use serde::Serialize;
use serde_json::{json, Value};

use crate::artifacts::{ArtifactName, ArtifactStore, PostingRecord};
use crate::pipeline::types::PipelineError;

const RAW_PREVIEW_ROWS: usize = 3;
const MATCH_PREVIEW_ROWS: usize = 5;

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    title: &'a str,
    company: &'a str,
    summary: &'a str,
}

#[derive(Debug, Serialize)]
struct MatchRow<'a> {
    title: &'a str,
    company: &'a str,
    match_score: Option<f32>,
    link: &'a str,
    summary: &'a str,
    responsibilities: &'a str,
}

#[derive(Debug, Serialize)]
struct ExplanationRow<'a> {
    title: &'a str,
    company: &'a str,
    match_score: Option<f32>,
    explanation: &'a str,
}

/// Builds the preview payload for `name`. The caller checks existence first.
pub async fn preview(store: &ArtifactStore, name: ArtifactName) -> Result<Value, PipelineError> {
    if !name.is_tabular() {
        let content = store.read_text(name).await?;
        return Ok(json!({ "content": content }));
    }

    let records = store.read_records(name).await?;
    Ok(preview_records(name, &records)?)
}

fn preview_records(name: ArtifactName, records: &[PostingRecord]) -> serde_json::Result<Value> {
    match name {
        ArtifactName::RawPostings => {
            serde_json::to_value(&records[..records.len().min(RAW_PREVIEW_ROWS)])
        }
        ArtifactName::RewrittenPostings => serde_json::to_value(
            records
                .iter()
                .map(|r| SummaryRow {
                    title: &r.title,
                    company: &r.company,
                    summary: &r.summary,
                })
                .collect::<Vec<_>>(),
        ),
        ArtifactName::EmbeddingMatches | ArtifactName::RerankMatches => serde_json::to_value(
            records
                .iter()
                .take(MATCH_PREVIEW_ROWS)
                .map(|r| MatchRow {
                    title: &r.title,
                    company: &r.company,
                    match_score: r.match_score,
                    link: &r.link,
                    summary: &r.summary,
                    responsibilities: &r.responsibilities,
                })
                .collect::<Vec<_>>(),
        ),
        ArtifactName::Explanations => serde_json::to_value(
            records
                .iter()
                .map(|r| ExplanationRow {
                    title: &r.title,
                    company: &r.company,
                    match_score: r.match_score,
                    explanation: r.explanation.as_deref().unwrap_or_default(),
                })
                .collect::<Vec<_>>(),
        ),
        ArtifactName::ConvertedCv | ArtifactName::SynthesizedCv => serde_json::to_value(records),
    }
}
