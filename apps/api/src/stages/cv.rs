//! CV stages: PDF to normalized text, then text to a synthesized profile.

use std::path::PathBuf;

use crate::artifacts::ArtifactName;
use crate::llm_client::prompts::fill;
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::PipelineError;
use crate::stages::prompts::{CV_SYNTHESIS_PROMPT, CV_SYNTHESIS_SYSTEM};
use crate::stages::StageServices;
use crate::text::normalize_extracted;

pub async fn convert(
    document: PathBuf,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<(), PipelineError> {
    let display_name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    progress.log(format!("Extracting text from {display_name}..."));

    // pdf-extract is synchronous and CPU-bound.
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&document))
        .await
        .map_err(|e| PipelineError::external("PDF extraction task", e))?
        .map_err(|e| PipelineError::external("Reading PDF", e))?;

    if pages.is_empty() {
        return Err(PipelineError::ExternalFailure(format!(
            "{display_name} has no pages"
        )));
    }
    progress.log(format!("{} page(s) read. Normalizing...", pages.len()));

    let assembled = assemble_pages(&pages);
    for page in &assembled.empty_pages {
        progress.log(format!("Page {page}: no selectable text"));
    }
    if assembled.text.trim().is_empty() {
        return Err(PipelineError::MalformedOutput(format!(
            "no text could be extracted from {display_name}"
        )));
    }

    services
        .store
        .write_text(ArtifactName::ConvertedCv, &assembled.text)
        .await?;
    progress.log(format!(
        "Conversion finished: {}",
        ArtifactName::ConvertedCv.file_name()
    ));
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AssembledText {
    text: String,
    /// 1-based numbers of pages that had no text after normalization.
    empty_pages: Vec<usize>,
}

/// Normalizes every page and joins them under `--- PAGE n ---` headers,
/// skipping pages with no text.
fn assemble_pages(pages: &[String]) -> AssembledText {
    let mut assembled = AssembledText::default();
    for (i, page) in pages.iter().enumerate() {
        let number = i + 1;
        let cleaned = normalize_extracted(page);
        if cleaned.is_empty() {
            assembled.empty_pages.push(number);
            continue;
        }
        if !assembled.text.is_empty() {
            assembled.text.push_str("\n\n");
        }
        assembled.text.push_str(&format!("--- PAGE {number} ---\n"));
        assembled.text.push_str(&cleaned);
    }
    assembled
}

pub async fn rewrite(services: &StageServices, progress: &ProgressSink) -> Result<(), PipelineError> {
    let cv = services.store.read_text(ArtifactName::ConvertedCv).await?;
    progress.log(format!(
        "Synthesizing CV ({} characters)...",
        cv.chars().count()
    ));

    let prompt = fill(CV_SYNTHESIS_PROMPT, &[("cv", cv.as_str())]);
    let synthesis = services
        .generator
        .generate(CV_SYNTHESIS_SYSTEM, &prompt)
        .await?;
    let synthesis = synthesis.trim();
    if synthesis.is_empty() {
        return Err(PipelineError::MalformedOutput(
            "the model returned an empty CV synthesis".into(),
        ));
    }

    services
        .store
        .write_text(ArtifactName::SynthesizedCv, synthesis)
        .await?;
    progress.log(format!(
        "CV synthesis finished: {}",
        ArtifactName::SynthesizedCv.file_name()
    ));
    Ok(())
}
