//! The seven pipeline stages. Each one reads its input artifacts from the
//! store, calls out to models or the network, and writes exactly one output
//! artifact. Progress goes through the [`ProgressSink`] it is handed.
//!
//! Stages never touch the task tracker's state: the orchestrator owns the
//! RUNNING → COMPLETED/ERROR transitions.

pub mod cv;
pub mod explain;
pub mod ingest;
pub mod jobs;
pub mod matching;
pub mod prompts;

use std::sync::Arc;

use serde::Deserialize;

use crate::artifacts::ArtifactStore;
use crate::llm_client::{CrossEncoder, Embedder, TextGenerator};
use crate::pipeline::contracts::ResolvedInputs;
use crate::pipeline::tracker::ProgressSink;
use crate::pipeline::types::{PipelineError, StageId};
use crate::scrape::PostingSource;

pub const DEFAULT_KEYWORD: &str = "Data Analyst";
pub const DEFAULT_NUM_JOBS: usize = 5;
/// Pasted posting text shorter than this is rejected before anything runs.
pub const MIN_MANUAL_CHARS: usize = 10;

/// How the ingest stage gets its postings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IngestMode {
    /// Search the job board for `keyword` (or use it as a URL) and fetch up
    /// to `num_jobs` postings.
    Fetch {
        #[serde(default = "default_keyword")]
        keyword: String,
        #[serde(default = "default_num_jobs")]
        num_jobs: usize,
    },
    /// Parse one pasted posting with the text generator.
    Text { text: String },
}

fn default_keyword() -> String {
    DEFAULT_KEYWORD.to_string()
}

fn default_num_jobs() -> usize {
    DEFAULT_NUM_JOBS
}

impl IngestMode {
    /// Argument checks that do not need the store.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            IngestMode::Fetch { keyword, num_jobs } => {
                if keyword.trim().is_empty() {
                    return Err("keyword must not be empty".into());
                }
                if *num_jobs == 0 {
                    return Err("num_jobs must be at least 1".into());
                }
                Ok(())
            }
            IngestMode::Text { text } => {
                if text.trim().chars().count() < MIN_MANUAL_CHARS {
                    return Err(format!(
                        "posting text must be at least {MIN_MANUAL_CHARS} characters"
                    ));
                }
                Ok(())
            }
        }
    }
}

/// One request to run a stage, with its stage-specific arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    Ingest(IngestMode),
    RewriteJobs,
    ConvertCv { file_name: String },
    RewriteCv,
    EmbedMatch,
    RerankMatch,
    Explain,
}

impl StageRequest {
    pub fn stage(&self) -> StageId {
        match self {
            StageRequest::Ingest(_) => StageId::Ingest,
            StageRequest::RewriteJobs => StageId::RewriteJobs,
            StageRequest::ConvertCv { .. } => StageId::ConvertCv,
            StageRequest::RewriteCv => StageId::RewriteCv,
            StageRequest::EmbedMatch => StageId::EmbedMatch,
            StageRequest::RerankMatch => StageId::RerankMatch,
            StageRequest::Explain => StageId::Explain,
        }
    }

    /// Request for a stage that takes no arguments, `None` for ingest and
    /// convert_cv.
    pub fn without_args(stage: StageId) -> Option<Self> {
        match stage {
            StageId::Ingest | StageId::ConvertCv => None,
            StageId::RewriteJobs => Some(StageRequest::RewriteJobs),
            StageId::RewriteCv => Some(StageRequest::RewriteCv),
            StageId::EmbedMatch => Some(StageRequest::EmbedMatch),
            StageId::RerankMatch => Some(StageRequest::RerankMatch),
            StageId::Explain => Some(StageRequest::Explain),
        }
    }

    /// The uploaded file a convert request points at.
    pub fn document_name(&self) -> Option<&str> {
        match self {
            StageRequest::ConvertCv { file_name } => Some(file_name),
            _ => None,
        }
    }
}

/// Everything a stage may call out to. Built once at startup; tests swap the
/// trait objects for fakes.
pub struct StageServices {
    pub store: ArtifactStore,
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn Embedder>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    pub postings: Arc<dyn PostingSource>,
    /// Job board search page used when ingest gets a keyword.
    pub search_base: String,
}

/// Runs the requested stage to completion.
pub async fn run_stage(
    request: StageRequest,
    inputs: ResolvedInputs,
    services: &StageServices,
    progress: &ProgressSink,
) -> Result<(), PipelineError> {
    match request {
        StageRequest::Ingest(mode) => ingest::run(mode, services, progress).await,
        StageRequest::RewriteJobs => jobs::rewrite(services, progress).await,
        StageRequest::ConvertCv { .. } => {
            let document = inputs.document.ok_or_else(|| {
                PipelineError::ExternalFailure("no uploaded document resolved".into())
            })?;
            cv::convert(document, services, progress).await
        }
        StageRequest::RewriteCv => cv::rewrite(services, progress).await,
        StageRequest::EmbedMatch => matching::embed(services, progress).await,
        StageRequest::RerankMatch => matching::rerank(services, progress).await,
        StageRequest::Explain => {
            let source = inputs.matches().ok_or_else(|| {
                PipelineError::ExternalFailure("no matches artifact resolved".into())
            })?;
            explain::run(source, services, progress).await
        }
    }
}

/// Fakes shared by the stage and orchestrator tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use reqwest::Url;

    use super::*;
    use crate::llm_client::LlmError;
    use crate::pipeline::tracker::TaskTracker;
    use crate::scrape::{PostingLink, PostingPage};

    /// Replies from a queue; echoes the prompt once the queue is empty.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedGenerator {
        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(LlmError::Api {
                    status: 500,
                    message,
                }),
                None => Ok(prompt.to_string()),
            }
        }
    }

    /// The CV (first text) and any text containing an `aligned` word embed
    /// as `[1, 0]`; everything else as the orthogonal `[0, 1]`.
    pub struct KeywordEmbedder {
        pub aligned: Vec<&'static str>,
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i == 0 || self.aligned.iter().any(|w| t.contains(w)) {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Scores documents by position: the last document gets the highest logit.
    pub struct PositionalCrossEncoder;

    #[async_trait]
    impl CrossEncoder for PositionalCrossEncoder {
        async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, LlmError> {
            Ok((0..documents.len()).map(|i| i as f32 - 1.0).collect())
        }
    }

    /// Serves canned results; pages listed in `broken` fail to load.
    #[derive(Default)]
    pub struct StaticPostingSource {
        pub links: Vec<PostingLink>,
        pub pages: Vec<(String, PostingPage)>,
        pub broken: Vec<String>,
    }

    #[async_trait]
    impl PostingSource for StaticPostingSource {
        async fn discover(&self, _search_url: &Url, limit: usize) -> anyhow::Result<Vec<PostingLink>> {
            Ok(self.links.iter().take(limit).cloned().collect())
        }

        async fn fetch_page(&self, url: &str) -> anyhow::Result<PostingPage> {
            if self.broken.iter().any(|b| b == url) {
                return Err(anyhow!("connection reset"));
            }
            self.pages
                .iter()
                .find(|(u, _)| u == url)
                .map(|(_, page)| page.clone())
                .ok_or_else(|| anyhow!("404 for {url}"))
        }
    }

    pub fn services(root: &Path, generator: ScriptedGenerator) -> StageServices {
        services_with_source(root, generator, StaticPostingSource::default())
    }

    pub fn services_with_source(
        root: &Path,
        generator: ScriptedGenerator,
        source: StaticPostingSource,
    ) -> StageServices {
        StageServices {
            store: ArtifactStore::new(root),
            generator: Arc::new(generator),
            embedder: Arc::new(KeywordEmbedder {
                aligned: vec!["Rust"],
            }),
            cross_encoder: Arc::new(PositionalCrossEncoder),
            postings: Arc::new(source),
            search_base: "https://jobs.example.com/search.html".into(),
        }
    }

    /// A tracker with `stage` RUNNING and a sink bound to that run.
    pub fn running(stage: StageId) -> (TaskTracker, ProgressSink) {
        let tracker = TaskTracker::new();
        let (run, ()) = tracker.try_begin(stage, || Ok(())).unwrap();
        let sink = tracker.sink(run, stage);
        (tracker, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_body_defaults() {
        let mode: IngestMode = serde_json::from_str(r#"{"mode": "fetch"}"#).unwrap();
        assert_eq!(
            mode,
            IngestMode::Fetch {
                keyword: DEFAULT_KEYWORD.into(),
                num_jobs: DEFAULT_NUM_JOBS
            }
        );
    }

    #[test]
    fn test_ingest_text_body() {
        let mode: IngestMode =
            serde_json::from_str(r#"{"mode": "text", "text": "Rust engineer wanted"}"#).unwrap();
        assert!(matches!(mode, IngestMode::Text { .. }));
        assert!(mode.validate().is_ok());
    }

    #[test]
    fn test_short_manual_text_is_invalid() {
        let mode = IngestMode::Text {
            text: "  short  ".into(),
        };
        assert!(mode.validate().is_err());
    }

    #[test]
    fn test_zero_jobs_is_invalid() {
        let mode = IngestMode::Fetch {
            keyword: "rust".into(),
            num_jobs: 0,
        };
        assert!(mode.validate().is_err());
    }

    #[test]
    fn test_requests_without_args() {
        for stage in StageId::ALL {
            match StageRequest::without_args(stage) {
                Some(request) => assert_eq!(request.stage(), stage),
                None => assert!(matches!(stage, StageId::Ingest | StageId::ConvertCv)),
            }
        }
    }
}
