//! Model artifact: trained weights plus the metadata needed to use them

use crate::feature_extractor::FeatureLayout;
use crate::models::inference::FraudModel;
use crate::models::tree::TreeEnsemble;
use crate::types::request::field_spec;
use crate::types::score::{ImportanceCuts, RiskLevelCuts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// On-disk artifact document written by the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument {
    /// Training timestamp; doubles as the model version
    #[serde(alias = "version")]
    pub training_date: String,

    #[serde(default = "default_model_type")]
    pub model_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_state: Option<i64>,

    /// Feature order the model was trained on
    pub feature_names: Vec<String>,

    /// Global importance per feature, parallel to `feature_names`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<Vec<f64>>,

    /// Reference profile for explanations, parallel to `feature_names`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_reference: Option<Vec<f64>>,

    pub model: ModelSpec,
}

fn default_model_type() -> String {
    "LightGBM".to_string()
}

/// Model payload of an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Trees embedded in the artifact document
    TreeEnsemble(TreeEnsemble),
    /// ONNX graph stored next to the artifact document
    Onnx { path: String },
}

/// Descriptive metadata of a loaded artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub version: String,
    pub model_type: String,
    pub training_date: String,
    pub random_state: Option<i64>,
    pub backend: String,
    pub source: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

/// A loaded, validated model and everything needed to score with it.
///
/// Immutable once built; the holder swaps whole artifacts, so weights and
/// feature order always travel together.
pub struct ModelArtifact {
    metadata: ArtifactMetadata,
    layout: FeatureLayout,
    model: Box<dyn FraudModel>,
    importance: Vec<f64>,
    sorted_importance: Vec<f64>,
    reference: Vec<f64>,
}

impl ModelArtifact {
    /// Assemble an artifact, checking that metadata and model agree.
    pub fn new(
        document_meta: ArtifactParts,
        model: Box<dyn FraudModel>,
        source: Option<&Path>,
    ) -> Result<Self, String> {
        let ArtifactParts {
            training_date,
            model_type,
            random_state,
            feature_names,
            feature_importance,
            feature_reference,
        } = document_meta;

        if training_date.trim().is_empty() {
            return Err("training_date is empty".to_string());
        }

        let layout = FeatureLayout::resolve(&feature_names)?;
        let n = layout.len();

        if model.feature_count() != n {
            return Err(format!(
                "model expects {} features but artifact lists {}",
                model.feature_count(),
                n
            ));
        }

        let importance = match feature_importance {
            Some(values) => {
                if values.len() != n {
                    return Err(format!(
                        "feature_importance has {} values for {} features",
                        values.len(),
                        n
                    ));
                }
                if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                    return Err(format!("invalid feature importance value {}", bad));
                }
                values
            }
            None => Vec::new(),
        };

        let reference = match feature_reference {
            Some(values) => {
                if values.len() != n {
                    return Err(format!(
                        "feature_reference has {} values for {} features",
                        values.len(),
                        n
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err("feature_reference contains a non-finite value".to_string());
                }
                values
            }
            None => layout
                .names()
                .iter()
                .map(|name| field_spec(name).map(|spec| spec.default).unwrap_or(0.0))
                .collect(),
        };

        let mut sorted_importance = importance.clone();
        sorted_importance.sort_by(f64::total_cmp);

        Ok(Self {
            metadata: ArtifactMetadata {
                version: training_date.clone(),
                model_type,
                training_date,
                random_state,
                backend: model.backend().to_string(),
                source: source.map(|p| p.display().to_string()),
                loaded_at: Utc::now(),
            },
            layout,
            model,
            importance,
            sorted_importance,
            reference,
        })
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn feature_names(&self) -> &[String] {
        self.layout.names()
    }

    pub fn model(&self) -> &dyn FraudModel {
        self.model.as_ref()
    }

    /// Global importance parallel to `feature_names`; empty when the
    /// training pipeline did not export it.
    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn has_importance(&self) -> bool {
        !self.importance.is_empty()
    }

    /// Reference profile parallel to `feature_names`
    pub fn feature_reference(&self) -> &[f64] {
        &self.reference
    }

    /// Feature importance pairs, most important first
    pub fn ranked_importance(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .layout
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.importance.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Importance value at quantile `q` (linear interpolation)
    pub fn importance_quantile(&self, q: f64) -> Option<f64> {
        quantile(&self.sorted_importance, q)
    }

    /// Resolve quantile cut points to absolute importance values
    pub fn importance_cuts(&self, cuts: &RiskLevelCuts) -> Option<ImportanceCuts> {
        Some(ImportanceCuts {
            medium: self.importance_quantile(cuts.medium)?,
            high: self.importance_quantile(cuts.high)?,
        })
    }
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("metadata", &self.metadata)
            .field("features", &self.layout.len())
            .field("backend", &self.model.backend())
            .finish()
    }
}

/// Metadata fields of an artifact document, detached from the model payload
#[derive(Debug, Clone)]
pub struct ArtifactParts {
    pub training_date: String,
    pub model_type: String,
    pub random_state: Option<i64>,
    pub feature_names: Vec<String>,
    pub feature_importance: Option<Vec<f64>>,
    pub feature_reference: Option<Vec<f64>>,
}

impl ArtifactDocument {
    /// Split into metadata and model payload
    pub fn into_parts(self) -> (ArtifactParts, ModelSpec) {
        (
            ArtifactParts {
                training_date: self.training_date,
                model_type: self.model_type,
                random_state: self.random_state,
                feature_names: self.feature_names,
                feature_importance: self.feature_importance,
                feature_reference: self.feature_reference,
            },
            self.model,
        )
    }
}

/// Resolve a model file path relative to the artifact document
pub fn resolve_relative(artifact_path: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        artifact_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(candidate)
    }
}

/// Linear-interpolated quantile of an ascending slice
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tree::{Objective, Tree, TreeNode};

    fn parts(names: &[&str], importance: Option<Vec<f64>>) -> ArtifactParts {
        ArtifactParts {
            training_date: "2024-01-15T10:30:00".to_string(),
            model_type: "LightGBM".to_string(),
            random_state: Some(42),
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            feature_importance: importance,
            feature_reference: None,
        }
    }

    fn model(num_features: usize) -> Box<dyn FraudModel> {
        let mut ensemble = TreeEnsemble::new(
            Objective::Binary,
            0.0,
            vec![Tree {
                nodes: vec![TreeNode::Leaf { value: 0.0 }],
            }],
        );
        ensemble.validate(num_features).unwrap();
        Box::new(ensemble)
    }

    #[test]
    fn test_artifact_assembly() {
        let artifact = ModelArtifact::new(
            parts(
                &["order_value", "return_rate", "hour_of_day"],
                Some(vec![0.2, 0.5, 0.1]),
            ),
            model(3),
            None,
        )
        .unwrap();

        assert_eq!(artifact.version(), "2024-01-15T10:30:00");
        assert_eq!(artifact.layout().indices(), &[8, 4, 19]);
        assert_eq!(artifact.feature_reference(), &[150.0, 0.1, 14.0]);
        assert_eq!(
            artifact.ranked_importance(),
            vec![("return_rate", 0.5), ("order_value", 0.2), ("hour_of_day", 0.1)]
        );
        assert_eq!(artifact.metadata().backend, "tree_ensemble");
    }

    #[test]
    fn test_artifact_rejects_mismatches() {
        let err = ModelArtifact::new(parts(&["order_value", "return_rate"], None), model(3), None)
            .unwrap_err();
        assert!(err.contains("expects 3 features"));

        let err = ModelArtifact::new(
            parts(&["order_value", "return_rate"], Some(vec![0.1])),
            model(2),
            None,
        )
        .unwrap_err();
        assert!(err.contains("feature_importance"));

        let err = ModelArtifact::new(
            parts(&["order_value", "return_rate"], Some(vec![0.1, -0.3])),
            model(2),
            None,
        )
        .unwrap_err();
        assert!(err.contains("invalid feature importance"));

        let err = ModelArtifact::new(parts(&["order_value", "zip_code"], None), model(2), None)
            .unwrap_err();
        assert!(err.contains("zip_code"));
    }

    #[test]
    fn test_quantiles() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.0), Some(1.0));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 1.0), Some(4.0));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(quantile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn test_importance_cuts_without_importance() {
        let artifact =
            ModelArtifact::new(parts(&["order_value"], None), model(1), None).unwrap();
        assert!(!artifact.has_importance());
        assert_eq!(artifact.importance_cuts(&RiskLevelCuts::default()), None);
        assert!(artifact.ranked_importance().is_empty());
    }

    #[test]
    fn test_resolve_relative() {
        let base = Path::new("/srv/models/artifact.json");
        assert_eq!(
            resolve_relative(base, "fraud.onnx"),
            PathBuf::from("/srv/models/fraud.onnx")
        );
        assert_eq!(
            resolve_relative(base, "/opt/fraud.onnx"),
            PathBuf::from("/opt/fraud.onnx")
        );
    }
}
