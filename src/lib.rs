//! Return Fraud Scoring Library
//!
//! Online fraud-risk scoring for e-commerce return requests: a hot-swappable
//! gradient-boosted tree model behind an HTTP API and a NATS queue, with
//! per-prediction explanations and model health reporting.

pub mod api;
pub mod batch;
pub mod config;
pub mod consumer;
pub mod error;
pub mod explain;
pub mod feature_extractor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod producer;
pub mod scorer;
pub mod types;

pub use batch::{BatchCoordinator, BatchSummary};
pub use config::AppConfig;
pub use consumer::{RequestProcessor, ReturnRequestConsumer};
pub use error::{ErrorBody, ScoringError, ScoringResult};
pub use feature_extractor::{FeatureVectorBuilder, OutOfRangePolicy};
pub use models::{ModelArtifact, ModelHolder, ModelLoader};
pub use monitor::Monitor;
pub use producer::FlaggedReturnProducer;
pub use scorer::Scorer;
pub use types::{FlaggedReturn, ReturnRequest, ScoreResult};
