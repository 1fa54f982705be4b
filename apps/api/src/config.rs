use anyhow::{Context, Result};

pub const DEFAULT_EMBED_URL: &str = "http://localhost:8081";
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8082";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SEARCH_URL: &str = "https://www.hellowork.com/fr-fr/emploi/recherche.html";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Embedding server base URL (`POST /embed`).
    pub embed_url: String,
    /// Cross-encoder server base URL (`POST /rerank`).
    pub rerank_url: String,
    /// Artifact directory, created at startup.
    pub data_dir: String,
    /// Job board search page for the ingest stage's fetch mode.
    pub search_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            embed_url: env_or("EMBED_URL", DEFAULT_EMBED_URL),
            rerank_url: env_or("RERANK_URL", DEFAULT_RERANK_URL),
            data_dir: env_or("DATA_DIR", DEFAULT_DATA_DIR),
            search_url: env_or("SEARCH_URL", DEFAULT_SEARCH_URL),
            port: env_or("PORT", "5000")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
