//! HTTP surface of the scoring service

pub mod error;
pub mod handlers;

use crate::batch::BatchCoordinator;
use crate::config::AppConfig;
use crate::metrics::ScoringMetrics;
use crate::models::ModelHolder;
use crate::monitor::Monitor;
use crate::producer::FlaggedReturnProducer;
use crate::scorer::Scorer;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<Scorer>,
    pub batch: BatchCoordinator,
    pub monitor: Monitor,
    pub metrics: Arc<ScoringMetrics>,
    pub config: Arc<AppConfig>,
    /// Flagged-return publisher, when NATS is enabled
    pub alerts: Option<FlaggedReturnProducer>,
}

impl AppState {
    pub fn new(holder: Arc<ModelHolder>, config: AppConfig, metrics: Arc<ScoringMetrics>) -> Self {
        let scorer = Arc::new(Scorer::new(Arc::clone(&holder), &config.scoring));
        Self {
            batch: BatchCoordinator::new(Arc::clone(&scorer)),
            monitor: Monitor::new(holder),
            scorer,
            metrics,
            config: Arc::new(config),
            alerts: None,
        }
    }

    pub fn with_alerts(mut self, producer: FlaggedReturnProducer) -> Self {
        self.alerts = Some(producer);
        self
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_millis(state.config.server.request_timeout_ms);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::live))
        .route("/health/ready", get(handlers::ready))
        .route("/score", post(handlers::score))
        .route("/batch_score", post(handlers::batch_score))
        .route("/metrics", get(handlers::metrics))
        .route("/feature_importance", get(handlers::feature_importance))
        .route("/stats", get(handlers::stats))
        .route("/admin/reload", post(handlers::reload))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
