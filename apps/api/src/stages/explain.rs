//! Explain: one generator call per match, asking for a verdict and a short
//! justification. Rows keep the order (and scores) of the source table.

use crate::artifacts::ArtifactName;
use crate::llm_client::prompts::fill;
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::PipelineError;
use crate::stages::prompts::{EXPLAIN_PROMPT, EXPLAIN_SYSTEM};
use crate::stages::StageServices;

const UNKNOWN_TITLE: &str = "Unknown position";
const UNKNOWN_COMPANY: &str = "Unknown company";

/// `source` is the matches table picked during input resolution.
pub async fn run(
    source: ArtifactName,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<(), PipelineError> {
    progress.log(format!("Using {source}"));
    let cv = services.store.read_text(ArtifactName::SynthesizedCv).await?;
    let mut rows = services.store.read_records(source).await?;
    let total = rows.len();
    progress.log(format!("Explaining {total} match(es)..."));

    for (i, row) in rows.iter_mut().enumerate() {
        let title = non_empty(&row.title, UNKNOWN_TITLE);
        let company = non_empty(&row.company, UNKNOWN_COMPANY);
        let prompt = fill(
            EXPLAIN_PROMPT,
            &[
                ("cv", cv.as_str()),
                ("title", title),
                ("company", company),
                ("summary", row.summary.as_str()),
            ],
        );
        let reply = services.generator.generate(EXPLAIN_SYSTEM, &prompt).await?;
        progress.log(format!("[{}/{}] Explained: {title}", i + 1, total));
        row.explanation = Some(reply.trim().to_string());
    }

    services
        .store
        .write_records(ArtifactName::Explanations, &rows)
        .await?;
    progress.log(format!(
        "Explanations saved to {}",
        ArtifactName::Explanations.file_name()
    ));
    Ok(())
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::PostingRecord;
    use crate::pipeline::types::StageId;
    use crate::stages::testing::{running, services, ScriptedGenerator};

    #[tokio::test]
    async fn test_explanations_follow_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::with_replies([
            " Strong match: Rust everywhere. ",
            "No match: needs Java.",
        ]);
        let services = services(dir.path(), generator);
        services
            .store
            .write_text(ArtifactName::SynthesizedCv, "Rust developer")
            .await
            .unwrap();
        let matches = vec![
            PostingRecord {
                title: "Rust dev".into(),
                match_score: Some(91.0),
                ..Default::default()
            },
            PostingRecord {
                match_score: Some(12.5),
                ..Default::default()
            },
        ];
        services
            .store
            .write_records(ArtifactName::RerankMatches, &matches)
            .await
            .unwrap();
        let (tracker, sink) = running(StageId::Explain);

        run(ArtifactName::RerankMatches, &services, &sink)
            .await
            .unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::Explanations)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].explanation.as_deref(), Some("Strong match: Rust everywhere."));
        assert_eq!(rows[0].match_score, Some(91.0));
        assert_eq!(rows[1].explanation.as_deref(), Some("No match: needs Java."));

        let logs = tracker.snapshot().logs;
        assert!(logs.contains(&"Using Rerank matches (matches_rerank.json)".to_string()));
        assert!(logs.contains(&"[2/2] Explained: Unknown position".to_string()));
    }

    #[tokio::test]
    async fn test_prompt_carries_cv_and_posting() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path(), ScriptedGenerator::default());
        services
            .store
            .write_text(ArtifactName::SynthesizedCv, "CV-MARKER")
            .await
            .unwrap();
        let matches = vec![PostingRecord {
            title: "Analyst".into(),
            company: "Acme".into(),
            summary: "SUMMARY-MARKER".into(),
            ..Default::default()
        }];
        services
            .store
            .write_records(ArtifactName::EmbeddingMatches, &matches)
            .await
            .unwrap();
        let (_tracker, sink) = running(StageId::Explain);

        run(ArtifactName::EmbeddingMatches, &services, &sink)
            .await
            .unwrap();

        // The scripted generator echoes the prompt back.
        let rows = services
            .store
            .read_records(ArtifactName::Explanations)
            .await
            .unwrap();
        let explanation = rows[0].explanation.as_deref().unwrap();
        assert!(explanation.contains("CV-MARKER"));
        assert!(explanation.contains("Analyst at Acme"));
        assert!(explanation.contains("SUMMARY-MARKER"));
    }
}
