//! Embedding and cross-encoder calls against a text-embeddings-inference
//! style server (`POST /embed`, `POST /rerank`).
//!
//! Both endpoints are batch calls: one request per stage run, not per posting.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LlmError;

/// `embed(texts) -> vectors`. One vector per input, same order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// `score(pairs) -> scores` where every pair shares `query`.
/// Returns raw relevance logits, one per document, same order.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, LlmError>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
    truncate: bool,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

/// HTTP client for the embedding and reranking servers. They usually run as
/// two separate processes (one model each), hence two base URLs.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    embed_url: String,
    rerank_url: String,
}

impl InferenceClient {
    pub fn new(embed_url: &str, rerank_url: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()?,
            embed_url: embed_url.trim_end_matches('/').to_string(),
            rerank_url: rerank_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: String,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Embedder for InferenceClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            inputs: texts,
            normalize: true,
            truncate: true,
        };
        let vectors: Vec<Vec<f32>> = self
            .post(format!("{}/embed", self.embed_url), &body)
            .await?
            .json()
            .await?;
        if vectors.len() != texts.len() {
            return Err(LlmError::Shape(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        debug!(count = vectors.len(), "Embedding call succeeded");
        Ok(vectors)
    }
}

#[async_trait]
impl CrossEncoder for InferenceClient {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, LlmError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest {
            query,
            texts: documents,
            raw_scores: true,
            truncate: true,
        };
        let hits: Vec<RerankHit> = self
            .post(format!("{}/rerank", self.rerank_url), &body)
            .await?
            .json()
            .await?;
        debug!(count = hits.len(), "Rerank call succeeded");
        scores_in_input_order(hits, documents.len())
    }
}

/// The rerank endpoint returns hits sorted by score; put them back in
/// document order and make sure every document got exactly one score.
fn scores_in_input_order(hits: Vec<RerankHit>, expected: usize) -> Result<Vec<f32>, LlmError> {
    let mut scores = vec![None; expected];
    for hit in hits {
        let slot = scores
            .get_mut(hit.index)
            .ok_or_else(|| LlmError::Shape(format!("rerank index {} out of range", hit.index)))?;
        *slot = Some(hit.score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| LlmError::Shape(format!("no rerank score for document {i}"))))
        .collect()
}

/// Cosine similarity in [-1, 1]; 0 when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Maps a raw cross-encoder logit to (0, 1).
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}
