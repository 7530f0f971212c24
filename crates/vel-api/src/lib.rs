//! VEL API: HTTP endpoints over the run coordinator
//!
//! ```text
//! POST /run, /api/run        RunRequest → StageResult (400/422 on rejection)
//! GET  /health, /api/health  {ok, version}
//! GET  /metrics              prometheus text format
//! ```
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use metrics::Metrics;
use std::sync::Arc;
use vel_stages::{RunCoordinator, Settings};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Coordinator from `settings`, with metrics attached as its observer.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let coordinator = RunCoordinator::from_settings(settings)?.with_observer(metrics.clone());
        Ok(Self {
            coordinator: Arc::new(coordinator),
            metrics,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/run", post(handlers::run))
        .route("/api/run", post(handlers::run))
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::trace())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(&settings)?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;

    tracing::info!(addr = %settings.addr, store = ?settings.store, "VEL API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
