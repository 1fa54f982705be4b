use crate::artifacts::ArtifactStore;
use crate::pipeline::Orchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Same directory the stages read and write; handlers use it for
    /// uploads, downloads and previews.
    pub store: ArtifactStore,
    /// Owns the task tracker and the model clients.
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            store: orchestrator.services().store.clone(),
            orchestrator,
        }
    }
}
