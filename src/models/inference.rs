//! Model inference seam shared by every backend

use crate::error::{ScoringError, ScoringResult};
use crate::feature_extractor::FeatureVector;
use anyhow::Result;
use tracing::error;

/// A loaded binary classifier that maps a feature vector to P(fraud).
///
/// Implementations must be deterministic for frozen weights and safe to call
/// from many threads at once.
pub trait FraudModel: Send + Sync {
    /// Probability of the positive (fraud) class
    fn predict_proba(&self, features: &[f64]) -> Result<f64>;

    /// Number of inputs the model was bound to at load time
    fn feature_count(&self) -> usize;

    /// Backend name, e.g. `tree_ensemble` or `onnx`
    fn backend(&self) -> &'static str;
}

/// Run the model and check its output is a probability.
///
/// Failures are logged with the input digest and surfaced as
/// [`ScoringError::Inference`]; no score is ever substituted.
pub fn run_inference(
    model: &dyn FraudModel,
    features: &FeatureVector,
    model_version: &str,
) -> ScoringResult<f64> {
    let outcome = model
        .predict_proba(features.as_slice())
        .and_then(|p| {
            if p.is_finite() && (0.0..=1.0).contains(&p) {
                Ok(p)
            } else {
                Err(anyhow::anyhow!("model returned {} which is not a probability", p))
            }
        });

    outcome.map_err(|e| {
        let digest = features.digest();
        error!(
            backend = model.backend(),
            model_version = %model_version,
            input_digest = %digest,
            error = %e,
            "Model inference failed"
        );
        ScoringError::Inference {
            digest,
            reason: e.to_string(),
        }
    })
}
