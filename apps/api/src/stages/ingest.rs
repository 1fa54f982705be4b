//! Ingest: produce the raw postings table, either by fetching postings from
//! the job board or by parsing one pasted posting with the text generator.

use serde::Deserialize;

use crate::artifacts::{ArtifactName, PostingRecord};
use crate::llm_client::generate_json;
use crate::llm_client::prompts::{fill, truncate_chars, JSON_ONLY_SYSTEM, MAX_POSTING_CHARS};
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::PipelineError;
use crate::scrape::{self, PostingLink, PostingPage};
use crate::stages::prompts::MANUAL_PARSE_PROMPT;
use crate::stages::{IngestMode, StageServices};
use crate::text::{collapse_whitespace, split_sections};

/// Responsibilities column of a posting whose page could not be loaded.
pub const ACCESS_ERROR: &str = "Access error";
/// Link column of a pasted posting.
pub const MANUAL_LINK: &str = "Raw text (manual)";
/// Placeholder the model is told to use for missing fields.
pub const NOT_SPECIFIED: &str = "Not specified";
const SEE_POSTING: &str = "See posting";

pub async fn run(
    mode: IngestMode,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<(), PipelineError> {
    let records = match mode {
        IngestMode::Fetch { keyword, num_jobs } => {
            fetch(&keyword, num_jobs, services, progress).await?
        }
        IngestMode::Text { text } => vec![parse_manual(&text, services, progress).await?],
    };

    services
        .store
        .write_records(ArtifactName::RawPostings, &records)
        .await?;
    progress.log(format!(
        "{} posting(s) saved to {}",
        records.len(),
        ArtifactName::RawPostings.file_name()
    ));
    Ok(())
}

async fn fetch(
    keyword: &str,
    num_jobs: usize,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<Vec<PostingRecord>, PipelineError> {
    let url = scrape::search_url(&services.search_base, keyword)
        .map_err(|e| PipelineError::external("Building search URL", format!("{e:#}")))?;

    if keyword.trim().starts_with("http") {
        match scrape::keyword_in_url(&url) {
            Some(k) => progress.log(format!("URL detected. Keyword: {k}")),
            None => progress.log("URL detected."),
        }
    } else {
        progress.log(format!("Searching postings for: {keyword}"));
    }

    if scrape::is_single_posting(&url) {
        progress.log("Single posting URL, fetching it directly.");
        let page = services
            .postings
            .fetch_page(url.as_str())
            .await
            .map_err(|e| PipelineError::external("Fetching posting", format!("{e:#}")))?;
        let link = PostingLink {
            title: SEE_POSTING.into(),
            company: SEE_POSTING.into(),
            location: SEE_POSTING.into(),
            url: url.to_string(),
        };
        return Ok(vec![record_from_page(&link, page)]);
    }

    progress.log("Collecting posting links...");
    let links = services
        .postings
        .discover(&url, num_jobs)
        .await
        .map_err(|e| PipelineError::external("Searching postings", format!("{e:#}")))?;
    progress.log(format!("{} posting(s) found. Fetching details...", links.len()));

    let total = links.len();
    let mut records = Vec::with_capacity(total);
    for (i, link) in links.iter().enumerate() {
        progress.log(format!(
            "Processing {}/{}: {} - {}",
            i + 1,
            total,
            link.title,
            link.location
        ));
        // One bad page does not sink the batch.
        match services.postings.fetch_page(&link.url).await {
            Ok(page) => records.push(record_from_page(link, page)),
            Err(e) => {
                progress.log(format!("Could not load {}: {e:#}", link.title));
                records.push(access_error_record(link));
            }
        }
    }
    Ok(records)
}

fn record_from_page(link: &PostingLink, page: PostingPage) -> PostingRecord {
    let sections = split_sections(&page.text);
    let title = page
        .title
        .filter(|_| link.title == SEE_POSTING)
        .unwrap_or_else(|| link.title.clone());
    PostingRecord {
        title: collapse_whitespace(&title),
        company: link.company.clone(),
        location: link.location.clone(),
        responsibilities: sections.responsibilities,
        profile: sections.profile,
        link: link.url.clone(),
        ..Default::default()
    }
}

fn access_error_record(link: &PostingLink) -> PostingRecord {
    PostingRecord {
        title: link.title.clone(),
        company: link.company.clone(),
        location: link.location.clone(),
        responsibilities: ACCESS_ERROR.into(),
        link: link.url.clone(),
        ..Default::default()
    }
}

/// Shape the manual-parse prompt asks for. Missing keys fall back to
/// "Not specified".
#[derive(Debug, Deserialize)]
struct ParsedPosting {
    #[serde(default = "not_specified")]
    title: String,
    #[serde(default = "not_specified")]
    company: String,
    #[serde(default = "not_specified")]
    location: String,
    #[serde(default = "not_specified")]
    responsibilities: String,
    #[serde(default = "not_specified")]
    profile: String,
}

fn not_specified() -> String {
    NOT_SPECIFIED.to_string()
}

async fn parse_manual(
    text: &str,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<PostingRecord, PipelineError> {
    progress.log("Analysing pasted posting text...");
    let posting = truncate_chars(text.trim(), MAX_POSTING_CHARS);
    let prompt = fill(MANUAL_PARSE_PROMPT, &[("posting", posting)]);
    let parsed: ParsedPosting =
        generate_json(services.generator.as_ref(), JSON_ONLY_SYSTEM, &prompt).await?;

    let record = PostingRecord {
        title: collapse_whitespace(&parsed.title),
        company: collapse_whitespace(&parsed.company),
        location: collapse_whitespace(&parsed.location),
        responsibilities: flatten_lines(&parsed.responsibilities),
        profile: flatten_lines(&parsed.profile),
        link: MANUAL_LINK.into(),
        ..Default::default()
    };
    progress.log(format!("Parsed: {} at {}", record.title, record.company));
    Ok(record)
}

/// Table cells stay on one line.
fn flatten_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::StageId;
    use crate::stages::testing::{running, services, services_with_source, ScriptedGenerator, StaticPostingSource};

    fn link(n: u32) -> PostingLink {
        PostingLink {
            title: format!("Data Analyst {n}"),
            company: "Acme".into(),
            location: "Paris".into(),
            url: format!("https://jobs.example.com/emplois/{n}.html"),
        }
    }

    fn page(body: &str) -> PostingPage {
        PostingPage {
            title: Some("Data Analyst".into()),
            text: body.into(),
        }
    }

    #[tokio::test]
    async fn test_fetch_keeps_going_when_a_page_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticPostingSource {
            links: vec![link(1), link(2), link(3)],
            pages: vec![
                (link(1).url, page("Missions: build dashboards. Profil: SQL expert.")),
                (link(3).url, page("Missions: clean data.")),
            ],
            broken: vec![link(2).url],
        };
        let services = services_with_source(dir.path(), ScriptedGenerator::default(), source);
        let (tracker, sink) = running(StageId::Ingest);

        let mode = IngestMode::Fetch {
            keyword: "data".into(),
            num_jobs: 5,
        };
        run(mode, &services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::RawPostings)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].responsibilities, ACCESS_ERROR);
        assert_eq!(rows[1].link, link(2).url);
        assert!(rows[0].responsibilities.contains("build dashboards"));
        assert!(rows[0].profile.contains("SQL expert"));

        let logs = tracker.snapshot().logs;
        assert!(logs.iter().any(|l| l.starts_with("Could not load Data Analyst 2")));
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticPostingSource {
            links: vec![link(1), link(2), link(3)],
            pages: vec![(link(1).url, page("x")), (link(2).url, page("y"))],
            broken: vec![],
        };
        let services = services_with_source(dir.path(), ScriptedGenerator::default(), source);
        let (_tracker, sink) = running(StageId::Ingest);

        let mode = IngestMode::Fetch {
            keyword: "data".into(),
            num_jobs: 2,
        };
        run(mode, &services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::RawPostings)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_single_posting_url_uses_page_title() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://jobs.example.com/fr-fr/emplois/42.html";
        let source = StaticPostingSource {
            pages: vec![(
                url.into(),
                PostingPage {
                    title: Some("  Rust   Engineer ".into()),
                    text: "Build things".into(),
                },
            )],
            ..Default::default()
        };
        let services = services_with_source(dir.path(), ScriptedGenerator::default(), source);
        let (_tracker, sink) = running(StageId::Ingest);

        let mode = IngestMode::Fetch {
            keyword: url.into(),
            num_jobs: 5,
        };
        run(mode, &services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::RawPostings)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Rust Engineer");
        assert_eq!(rows[0].link, url);
    }

    #[tokio::test]
    async fn test_manual_text_is_parsed_into_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"Sure! {"title": "Data Analyst", "company": "Acme",
            "responsibilities": "Build dashboards\nAutomate reports", "profile": "SQL"}"#;
        let services = services(dir.path(), ScriptedGenerator::with_replies([reply]));
        let (tracker, sink) = running(StageId::Ingest);

        let mode = IngestMode::Text {
            text: "We are hiring a data analyst in Paris".into(),
        };
        run(mode, &services, &sink).await.unwrap();

        let rows = services
            .store
            .read_records(ArtifactName::RawPostings)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Data Analyst");
        assert_eq!(rows[0].location, NOT_SPECIFIED);
        assert_eq!(rows[0].responsibilities, "Build dashboards Automate reports");
        assert_eq!(rows[0].link, MANUAL_LINK);
        assert!(tracker
            .snapshot()
            .logs
            .contains(&"Parsed: Data Analyst at Acme".to_string()));
    }

    #[tokio::test]
    async fn test_manual_text_without_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(
            dir.path(),
            ScriptedGenerator::with_replies(["I cannot help with that."]),
        );
        let (_tracker, sink) = running(StageId::Ingest);

        let mode = IngestMode::Text {
            text: "We are hiring a data analyst in Paris".into(),
        };
        let err = run(mode, &services, &sink).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));
        assert!(!services.store.exists(ArtifactName::RawPostings));
    }

    #[test]
    fn test_flatten_lines() {
        assert_eq!(flatten_lines(" a \n\n b\r\n c "), "a b c");
    }
}
