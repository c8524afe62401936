//! Per-prediction explanation.
//!
//! Global feature importance is re-weighted by how far this request's value
//! sits from the artifact's reference profile:
//!
//! ```text
//! importance_i = global_i × (1 + |x_i − ref_i| / max(|ref_i|, 1))
//! ```
//!
//! The top N features by that weight are reported, each tagged with a risk
//! level from its global importance against the artifact's quantile cuts.

use crate::feature_extractor::FeatureVector;
use crate::models::ModelArtifact;
use crate::types::score::{RiskFactor, RiskLevel, RiskLevelCuts};

/// Top `top_n` risk factors for `vector` under `artifact`.
///
/// Pure: depends only on the vector and the artifact's importance and
/// reference data. Returns an empty list when the artifact carries no
/// importance.
pub fn top_risk_factors(
    vector: &FeatureVector,
    artifact: &ModelArtifact,
    top_n: usize,
    cuts: &RiskLevelCuts,
) -> Vec<RiskFactor> {
    let Some(absolute_cuts) = artifact.importance_cuts(cuts) else {
        return Vec::new();
    };

    let mut weighted: Vec<(usize, f64)> = artifact
        .feature_importance()
        .iter()
        .zip(artifact.feature_reference())
        .zip(vector.as_slice())
        .map(|((&global, &reference), &value)| instance_weight(global, value, reference))
        .enumerate()
        .collect();

    // stable: ties keep model feature order
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));

    let names = artifact.feature_names();
    let global = artifact.feature_importance();
    weighted
        .into_iter()
        .take(top_n)
        .map(|(i, importance)| RiskFactor {
            feature: names[i].clone(),
            value: vector.as_slice()[i],
            importance,
            risk_level: RiskLevel::from_importance(global[i], &absolute_cuts),
        })
        .collect()
}

/// Global importance scaled by relative deviation from the reference.
///
/// Saturates at `f64::MAX` so extreme but valid inputs still rank first
/// and serialize as numbers.
fn instance_weight(global: f64, value: f64, reference: f64) -> f64 {
    if global == 0.0 {
        return 0.0;
    }
    let deviation = (value - reference).abs() / reference.abs().max(1.0);
    (global * (1.0 + deviation)).min(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureVectorBuilder;
    use crate::models::{ArtifactDocument, ModelLoader};
    use crate::types::ReturnRequest;

    fn artifact(importance: Option<&str>) -> ModelArtifact {
        let importance = importance
            .map(|values| format!(r#""feature_importance": {values},"#))
            .unwrap_or_default();
        let json = format!(
            r#"{{
                "training_date": "2024-01-15T10:30:00",
                "feature_names": ["return_reason_suspicious", "user_age_days", "order_value", "hour_of_day"],
                {importance}
                "model": {{"format": "tree_ensemble", "trees": [{{"nodes": [{{"value": 0.0}}]}}]}}
            }}"#
        );
        let document: ArtifactDocument = serde_json::from_str(&json).unwrap();
        ModelLoader::new().build(document, None).unwrap()
    }

    fn vector(artifact: &ModelArtifact, request: &ReturnRequest) -> FeatureVector {
        let (_, vector) = FeatureVectorBuilder::default()
            .build(request, artifact.layout())
            .unwrap();
        vector
    }

    #[test]
    fn test_reference_profile_ranks_by_global_importance() {
        let artifact = artifact(Some("[0.4, 0.3, 0.2, 0.1]"));
        let request = ReturnRequest::new("u1", "o1");

        let factors = top_risk_factors(
            &vector(&artifact, &request),
            &artifact,
            3,
            &RiskLevelCuts::default(),
        );

        let names: Vec<&str> = factors.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, vec!["return_reason_suspicious", "user_age_days", "order_value"]);
        assert_eq!(factors[0].importance, 0.4);
        assert_eq!(factors[0].risk_level, RiskLevel::High);
        assert_eq!(factors[1].risk_level, RiskLevel::High);
        assert_eq!(factors[2].risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_unusual_values_move_up() {
        let artifact = artifact(Some("[0.4, 0.3, 0.2, 0.1]"));
        // order value far above the 150 reference
        let request = ReturnRequest::new("u1", "o1").with("order_value", 1500.0);

        let factors = top_risk_factors(
            &vector(&artifact, &request),
            &artifact,
            4,
            &RiskLevelCuts::default(),
        );

        assert_eq!(factors[0].feature, "order_value");
        assert_eq!(factors[0].value, 1500.0);
        assert!((factors[0].importance - 0.2 * 10.0).abs() < 1e-12);
        // risk level still reflects global importance
        assert_eq!(factors[0].risk_level, RiskLevel::Medium);
        assert_eq!(factors[3].feature, "hour_of_day");
        assert_eq!(factors[3].risk_level, RiskLevel::Low);
        for pair in factors.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
    }

    #[test]
    fn test_top_n_bounds_length() {
        let artifact = artifact(Some("[0.4, 0.3, 0.2, 0.1]"));
        let v = vector(&artifact, &ReturnRequest::new("u1", "o1"));
        assert_eq!(top_risk_factors(&v, &artifact, 10, &RiskLevelCuts::default()).len(), 4);
        assert!(top_risk_factors(&v, &artifact, 0, &RiskLevelCuts::default()).is_empty());
    }

    #[test]
    fn test_no_importance_no_factors() {
        let artifact = artifact(None);
        let v = vector(&artifact, &ReturnRequest::new("u1", "o1"));
        assert!(top_risk_factors(&v, &artifact, 5, &RiskLevelCuts::default()).is_empty());
    }

    #[test]
    fn test_extreme_values_keep_finite_importance() {
        let json = r#"{
            "training_date": "2024-01-15T10:30:00",
            "feature_names": ["recent_returns_30d", "order_value", "hour_of_day"],
            "feature_importance": [120.0, 45.0, 0.0],
            "model": {"format": "tree_ensemble", "trees": [{"nodes": [{"value": 0.0}]}]}
        }"#;
        let document: ArtifactDocument = serde_json::from_str(json).unwrap();
        let artifact = ModelLoader::new().build(document, None).unwrap();
        let request = ReturnRequest::new("u1", "o1")
            .with("recent_returns_30d", 1e307)
            .with("order_value", 1e308);

        let factors = top_risk_factors(
            &vector(&artifact, &request),
            &artifact,
            3,
            &RiskLevelCuts::default(),
        );

        assert_eq!(factors.len(), 3);
        assert!(factors.iter().all(|f| f.importance.is_finite()));
        assert_eq!(factors[0].feature, "recent_returns_30d");
        assert_eq!(factors[0].importance, f64::MAX);

        let json = serde_json::to_string(&factors).unwrap();
        let back: Vec<RiskFactor> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, factors);
    }

    #[test]
    fn test_instance_weight_edges() {
        assert_eq!(instance_weight(0.0, f64::MAX, -f64::MAX), 0.0);
        assert_eq!(instance_weight(2.0, f64::MAX, -f64::MAX), f64::MAX);
        assert_eq!(instance_weight(0.5, 3.0, 3.0), 0.5);
        assert!((instance_weight(0.5, 0.0, 0.1) - 0.55).abs() < 1e-12);
    }
}
