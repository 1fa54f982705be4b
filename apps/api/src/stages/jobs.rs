//! Posting rewrite: one generator call per raw posting, producing the short
//! `summary` the matchers compare against the CV.

use crate::artifacts::ArtifactName;
use crate::llm_client::prompts::{fill, truncate_chars, MAX_POSTING_CHARS};
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::PipelineError;
use crate::stages::prompts::{JOB_SUMMARY_PROMPT, JOB_SUMMARY_SYSTEM, SUMMARY_MARKER};
use crate::stages::StageServices;

pub async fn rewrite(services: &StageServices, progress: &ProgressSink) -> Result<(), PipelineError> {
    let mut postings = services
        .store
        .read_records(ArtifactName::RawPostings)
        .await?;
    let total = postings.len();
    progress.log(format!("Rewriting {total} posting(s)..."));

    for (i, posting) in postings.iter_mut().enumerate() {
        progress.log(format!("Rewriting {}/{}: {}", i + 1, total, posting.title));
        let prompt = fill(
            JOB_SUMMARY_PROMPT,
            &[
                ("title", posting.title.as_str()),
                ("company", posting.company.as_str()),
                ("location", posting.location.as_str()),
                (
                    "responsibilities",
                    truncate_chars(&posting.responsibilities, MAX_POSTING_CHARS),
                ),
                ("profile", truncate_chars(&posting.profile, MAX_POSTING_CHARS)),
            ],
        );
        let reply = services
            .generator
            .generate(JOB_SUMMARY_SYSTEM, &prompt)
            .await?;
        posting.summary = clean_summary(&reply);
    }

    services
        .store
        .write_records(ArtifactName::RewrittenPostings, &postings)
        .await?;
    progress.log(format!(
        "Rewrite finished: {}",
        ArtifactName::RewrittenPostings.file_name()
    ));
    Ok(())
}

/// Drops the summary marker and folds the bullet lines into one cell,
/// separated by " | ".
pub fn clean_summary(reply: &str) -> String {
    reply
        .replace(SUMMARY_MARKER, "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
