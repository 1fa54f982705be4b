//! Posting source for the ingest stage's fetch mode.
//!
//! The browser-automation side of scraping is out of scope; this is a plain
//! HTTP fetch plus the light HTML handling in [`html`]. The ingest stage only
//! sees the [`PostingSource`] trait.

pub mod html;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Lines longer than this on a result card are description, not a location.
const MAX_LOCATION_CHARS: usize = 50;

/// Shown for fields a result card did not carry.
pub const UNKNOWN_FIELD: &str = "N/A";

/// One posting found on a results page, before its detail page is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLink {
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
}

/// A fetched posting detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingPage {
    pub title: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait PostingSource: Send + Sync {
    /// Up to `limit` posting links from a search results page.
    async fn discover(&self, search_url: &Url, limit: usize) -> Result<Vec<PostingLink>>;

    /// Title and visible body text of a single posting page.
    async fn fetch_page(&self, url: &str) -> Result<PostingPage>;
}

/// Builds the search URL: a keyword goes into the `k` query parameter of
/// `search_base`; anything starting with `http` is used as is.
pub fn search_url(search_base: &str, keyword: &str) -> Result<Url> {
    let keyword = keyword.trim();
    if keyword.starts_with("http") {
        return Url::parse(keyword).with_context(|| format!("Invalid URL '{keyword}'"));
    }
    Url::parse_with_params(search_base, &[("k", keyword)])
        .with_context(|| format!("Invalid search URL '{search_base}'"))
}

/// A direct link to one posting rather than a results page.
pub fn is_single_posting(url: &Url) -> bool {
    let path = url.path();
    path.contains("/emplois/") && path.ends_with(".html")
}

/// Keyword carried by a pasted search URL, for the progress log.
pub fn keyword_in_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "k")
        .map(|(_, value)| value.into_owned())
}

/// `PostingSource` over plain HTTP GETs.
#[derive(Clone)]
pub struct HttpPostingSource {
    client: Client,
}

impl HttpPostingSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn get_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let body = response.text().await.context("Reading response body")?;
        debug!(url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

#[async_trait]
impl PostingSource for HttpPostingSource {
    async fn discover(&self, search_url: &Url, limit: usize) -> Result<Vec<PostingLink>> {
        let page = self.get_html(search_url.as_str()).await?;
        Ok(links_from_results(&page, search_url, limit))
    }

    async fn fetch_page(&self, url: &str) -> Result<PostingPage> {
        let page = self.get_html(url).await?;
        Ok(PostingPage {
            title: html::page_title(&page),
            text: html::visible_text(&page),
        })
    }
}

/// Result cards read as: title, company, then an optional short location line.
fn links_from_results(page: &str, base: &Url, limit: usize) -> Vec<PostingLink> {
    html::anchors(page, base, is_single_posting)
        .into_iter()
        .take(limit)
        .map(|anchor| {
            let mut lines = anchor.lines.into_iter();
            let title = lines.next().unwrap_or_default();
            let company = lines.next().unwrap_or_else(|| UNKNOWN_FIELD.to_string());
            let location = lines
                .next()
                .filter(|l| l.chars().count() < MAX_LOCATION_CHARS)
                .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
            PostingLink {
                title,
                company,
                location,
                url: anchor.url.to_string(),
            }
        })
        .collect()
}
