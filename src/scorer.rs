//! Fraud scorer for single return requests

use crate::config::ScoringConfig;
use crate::error::ScoringResult;
use crate::explain::top_risk_factors;
use crate::feature_extractor::{FeatureVectorBuilder, ValidatedReturn};
use crate::models::inference::run_inference;
use crate::models::{ModelArtifact, ModelHolder};
use crate::types::request::ReturnRequest;
use crate::types::score::{RiskLevelCuts, ScoreResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Scores return requests against the holder's live artifact.
///
/// Stateless apart from the shared holder, so one instance can serve any
/// number of concurrent callers.
pub struct Scorer {
    holder: Arc<ModelHolder>,
    builder: FeatureVectorBuilder,
    fraud_threshold: f64,
    top_n: usize,
    risk_level_cuts: RiskLevelCuts,
}

impl Scorer {
    pub fn new(holder: Arc<ModelHolder>, config: &ScoringConfig) -> Self {
        Self {
            holder,
            builder: FeatureVectorBuilder::new(config.out_of_range),
            fraud_threshold: config.fraud_threshold,
            top_n: config.top_n,
            risk_level_cuts: config.risk_level_cuts,
        }
    }

    pub fn holder(&self) -> &Arc<ModelHolder> {
        &self.holder
    }

    pub fn fraud_threshold(&self) -> f64 {
        self.fraud_threshold
    }

    pub fn builder(&self) -> &FeatureVectorBuilder {
        &self.builder
    }

    /// Score one request.
    ///
    /// Fails with `ModelNotLoaded` before any artifact is published, with
    /// `Validation` on malformed input and with `Inference` if the model
    /// call fails. Never substitutes a default score.
    pub fn score(&self, request: &ReturnRequest) -> ScoringResult<ScoreResult> {
        // One snapshot for the whole call: feature order, weights and
        // version all come from the same artifact.
        let artifact = self.holder.current()?;
        let validated = self.builder.validate(request)?;
        self.score_validated(&validated, &artifact)
    }

    /// Score an already validated request against a specific artifact
    pub fn score_validated(
        &self,
        validated: &ValidatedReturn,
        artifact: &ModelArtifact,
    ) -> ScoringResult<ScoreResult> {
        let vector = self.builder.project(validated, artifact.layout());
        let risk_score = run_inference(artifact.model(), &vector, artifact.version())?;

        let is_flagged = risk_score >= self.fraud_threshold;
        let confidence = ScoreResult::confidence_for(risk_score);
        let top_risk_factors =
            top_risk_factors(&vector, artifact, self.top_n, &self.risk_level_cuts);

        debug!(
            order_id = %validated.order_id,
            model_version = %artifact.version(),
            risk_score = risk_score,
            is_flagged = is_flagged,
            "Return request scored"
        );

        Ok(ScoreResult {
            risk_score,
            is_flagged,
            confidence,
            top_risk_factors,
            model_version: artifact.version().to_string(),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::models::{ArtifactDocument, ModelLoader};

    // base -1.0; suspicious reason +1.2 / -0.4; new account +0.3 / -0.5
    const ARTIFACT: &str = r#"{
        "training_date": "2024-01-15T10:30:00",
        "feature_names": ["return_reason_suspicious", "user_age_days", "return_rate"],
        "feature_importance": [0.5, 0.3, 0.2],
        "model": {
            "format": "tree_ensemble",
            "base_score": -1.0,
            "trees": [
                {"nodes": [
                    {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                    {"value": -0.4},
                    {"value": 1.2}
                ]},
                {"nodes": [
                    {"feature": 1, "threshold": 14.5, "left": 1, "right": 2},
                    {"value": 0.3},
                    {"value": -0.5}
                ]}
            ]
        }
    }"#;

    fn scorer_with(config: ScoringConfig) -> Scorer {
        let document: ArtifactDocument = serde_json::from_str(ARTIFACT).unwrap();
        let artifact = ModelLoader::new().build(document, None).unwrap();
        let holder = Arc::new(ModelHolder::with_artifact(ModelLoader::new(), artifact));
        Scorer::new(holder, &config)
    }

    fn scorer() -> Scorer {
        scorer_with(ScoringConfig::default())
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_low_risk_request() {
        let result = scorer().score(&ReturnRequest::new("u1", "o1")).unwrap();

        assert!((result.risk_score - sigmoid(-1.9)).abs() < 1e-12);
        assert!(!result.is_flagged);
        assert!((result.confidence - 2.0 * (0.5 - result.risk_score)).abs() < 1e-12);
        assert_eq!(result.model_version, "2024-01-15T10:30:00");
        assert_eq!(result.top_risk_factors.len(), 3);
    }

    #[test]
    fn test_high_risk_request_flagged() {
        let request = ReturnRequest::new("u1", "o1")
            .with("return_reason_suspicious", 1.0)
            .with("user_age_days", 5.0);
        let result = scorer().score(&request).unwrap();

        assert!((result.risk_score - sigmoid(0.5)).abs() < 1e-12);
        assert!(result.is_flagged);
        assert_eq!(result.top_risk_factors[0].feature, "return_reason_suspicious");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let exact = scorer()
            .score(&ReturnRequest::new("u1", "o1"))
            .unwrap()
            .risk_score;
        let config = ScoringConfig {
            fraud_threshold: exact,
            ..ScoringConfig::default()
        };
        let result = scorer_with(config).score(&ReturnRequest::new("u1", "o1")).unwrap();
        assert_eq!(result.risk_score, exact);
        assert!(result.is_flagged);
    }

    #[test]
    fn test_not_loaded() {
        let holder = Arc::new(ModelHolder::new(ModelLoader::new()));
        let scorer = Scorer::new(holder, &ScoringConfig::default());
        assert_eq!(
            scorer.score(&ReturnRequest::new("u1", "o1")).unwrap_err(),
            ScoringError::ModelNotLoaded
        );
    }

    #[test]
    fn test_validation_error_propagates() {
        let mut request = ReturnRequest::new("u1", "o1");
        request.order_id = None;
        let err = scorer().score(&request).unwrap_err();
        assert_eq!(err.field(), Some("order_id"));
    }

    #[test]
    fn test_idempotent_scores() {
        let scorer = scorer();
        let request = ReturnRequest::new("u1", "o1").with("user_age_days", 3.0);
        let first = scorer.score(&request).unwrap();
        let second = scorer.score(&request).unwrap();
        assert_eq!(first.risk_score.to_bits(), second.risk_score.to_bits());
        assert_eq!(first.top_risk_factors, second.top_risk_factors);
    }
}
