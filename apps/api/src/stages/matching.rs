//! Matching stages. Both score every rewritten posting against the
//! synthesized CV on a 0-100 scale and write the table sorted best first:
//!
//! - embedding: cosine similarity of bi-encoder vectors × 100
//! - rerank: sigmoid of the cross-encoder logit × 100

use crate::artifacts::records::sort_by_score_desc;
use crate::artifacts::{ArtifactName, PostingRecord};
use crate::llm_client::inference::{cosine_similarity, sigmoid};
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::PipelineError;
use crate::stages::StageServices;

async fn load_inputs(services: &StageServices) -> Result<(String, Vec<PostingRecord>), PipelineError> {
    let cv = services.store.read_text(ArtifactName::SynthesizedCv).await?;
    let postings = services
        .store
        .read_records(ArtifactName::RewrittenPostings)
        .await?;
    Ok((cv, postings))
}

pub async fn embed(services: &StageServices, progress: &ProgressSink) -> Result<(), PipelineError> {
    let (cv, mut postings) = load_inputs(services).await?;
    progress.log(format!("Embedding the CV and {} posting(s)...", postings.len()));

    let mut texts = Vec::with_capacity(postings.len() + 1);
    texts.push(cv);
    texts.extend(postings.iter().map(PostingRecord::matching_text));

    let vectors = services.embedder.embed(&texts).await?;
    let (cv_vector, posting_vectors) = vectors
        .split_first()
        .ok_or_else(|| PipelineError::MalformedOutput("no embedding returned for the CV".into()))?;
    ensure_one_per_posting(posting_vectors.len(), postings.len())?;

    for (posting, vector) in postings.iter_mut().zip(posting_vectors) {
        posting.match_score = Some(cosine_similarity(cv_vector, vector) * 100.0);
    }

    write_ranked(services, ArtifactName::EmbeddingMatches, postings, progress).await
}

pub async fn rerank(services: &StageServices, progress: &ProgressSink) -> Result<(), PipelineError> {
    let (cv, mut postings) = load_inputs(services).await?;
    progress.log(format!(
        "Cross-encoding {} CV/posting pair(s)...",
        postings.len()
    ));

    let documents: Vec<String> = postings.iter().map(PostingRecord::matching_text).collect();
    let logits = services.cross_encoder.score(&cv, &documents).await?;
    ensure_one_per_posting(logits.len(), postings.len())?;

    for (posting, logit) in postings.iter_mut().zip(logits) {
        posting.match_score = Some(sigmoid(logit) * 100.0);
    }

    write_ranked(services, ArtifactName::RerankMatches, postings, progress).await
}

fn ensure_one_per_posting(got: usize, expected: usize) -> Result<(), PipelineError> {
    if got != expected {
        return Err(PipelineError::MalformedOutput(format!(
            "expected {expected} score(s), got {got}"
        )));
    }
    Ok(())
}

async fn write_ranked(
    services: &StageServices,
    name: ArtifactName,
    mut postings: Vec<PostingRecord>,
    progress: &ProgressSink,
) -> Result<(), PipelineError> {
    sort_by_score_desc(&mut postings);
    services.store.write_records(name, &postings).await?;

    match postings.first().and_then(|p| p.match_score.map(|s| (p, s))) {
        Some((best, score)) => progress.log(format!(
            "Matching finished. Top score: {score:.2}% ({})",
            best.title
        )),
        None => progress.log("Matching finished. No postings to score."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::StageId;
    use crate::stages::testing::{running, services, ScriptedGenerator};

    async fn seed(services: &StageServices, titles: &[&str]) {
        services
            .store
            .write_text(ArtifactName::SynthesizedCv, "Rust developer")
            .await
            .unwrap();
        let postings: Vec<_> = titles
            .iter()
            .map(|t| PostingRecord {
                title: t.to_string(),
                summary: format!("{t} role"),
                ..Default::default()
            })
            .collect();
        services
            .store
            .write_records(ArtifactName::RewrittenPostings, &postings)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_embedding_scores_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path(), ScriptedGenerator::default());
        seed(&services, &["Python dev", "Rust dev"]).await;
        let (tracker, sink) = running(StageId::EmbedMatch);

        embed(&services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::EmbeddingMatches)
            .await
            .unwrap();
        assert_eq!(rows[0].title, "Rust dev");
        assert!((rows[0].match_score.unwrap() - 100.0).abs() < 1e-3);
        assert!(rows[1].match_score.unwrap().abs() < 1e-3);

        let logs = tracker.snapshot().logs;
        assert!(logs
            .iter()
            .any(|l| l.starts_with("Matching finished. Top score: 100.00%")));
    }

    #[tokio::test]
    async fn test_rerank_scores_are_sigmoid_percentages() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path(), ScriptedGenerator::default());
        seed(&services, &["first", "second", "third"]).await;
        let (_tracker, sink) = running(StageId::RerankMatch);

        rerank(&services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::RerankMatches)
            .await
            .unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
        // "second" got logit 0.
        assert!((rows[1].match_score.unwrap() - 50.0).abs() < 1e-3);
        assert!(rows
            .iter()
            .all(|r| (0.0..=100.0).contains(&r.match_score.unwrap())));
    }

    #[tokio::test]
    async fn test_no_postings_writes_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(dir.path(), ScriptedGenerator::default());
        seed(&services, &[]).await;
        let (tracker, sink) = running(StageId::EmbedMatch);

        embed(&services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::EmbeddingMatches)
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(
            tracker.snapshot().status,
            "Matching finished. No postings to score."
        );
    }

    #[test]
    fn test_score_count_mismatch_is_malformed() {
        assert!(matches!(
            ensure_one_per_posting(2, 3),
            Err(PipelineError::MalformedOutput(_))
        ));
        assert!(ensure_one_per_posting(3, 3).is_ok());
    }
}
