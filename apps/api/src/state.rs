use std::sync::Arc;

use crate::config::Config;
use crate::generation::orchestrator::Orchestrator;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable persistence. Default: PgStore; tests use the in-memory store.
    pub store: Arc<dyn Store>,
    /// Owns the model client and the job tracker; every generation job goes
    /// through it.
    pub orchestrator: Orchestrator,
    pub config: Config,
}
