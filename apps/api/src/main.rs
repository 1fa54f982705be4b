mod artifacts;
mod config;
mod errors;
mod llm_client;
mod pipeline;
mod routes;
mod scrape;
mod stages;
mod state;
mod text;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::llm_client::{InferenceClient, LlmClient};
use crate::pipeline::Orchestrator;
use crate::routes::build_router;
use crate::scrape::HttpPostingSource;
use crate::stages::StageServices;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobmatch API v{}", env!("CARGO_PKG_VERSION"));

    // Artifact directory
    let store = ArtifactStore::new(&config.data_dir);
    store
        .ensure_root()
        .await
        .with_context(|| format!("Cannot create data directory '{}'", config.data_dir))?;
    info!("Artifacts stored in {}", store.root().display());

    // Model clients
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let inference = Arc::new(InferenceClient::new(&config.embed_url, &config.rerank_url)?);
    info!(
        "Inference client initialized (embed: {}, rerank: {})",
        config.embed_url, config.rerank_url
    );

    let postings = HttpPostingSource::new()?;

    // Build app state
    let orchestrator = Orchestrator::new(StageServices {
        store,
        generator: Arc::new(llm),
        embedder: inference.clone(),
        cross_encoder: inference,
        postings: Arc::new(postings),
        search_base: config.search_url.clone(),
    });
    let state = AppState::new(orchestrator);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
