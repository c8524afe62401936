//! Model artifact loader

use crate::error::{ScoringError, ScoringResult};
use crate::models::artifact::{ArtifactDocument, ModelArtifact, ModelSpec};
use crate::models::inference::FraudModel;
use std::path::Path;
use tracing::info;

/// Loads and validates artifacts written by the training pipeline
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load an artifact document from file.
    ///
    /// Any problem (missing file, bad JSON, inconsistent metadata, malformed
    /// trees) is a [`ScoringError::ModelLoad`].
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ScoringResult<ModelArtifact> {
        let path = path.as_ref();
        let fail = |reason: String| ScoringError::model_load(path.display().to_string(), reason);

        info!(path = %path.display(), "Loading model artifact");

        let raw = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let document: ArtifactDocument =
            serde_json::from_str(&raw).map_err(|e| fail(format!("invalid artifact: {}", e)))?;

        let artifact = self.build(document, Some(path)).map_err(fail)?;

        info!(
            version = %artifact.version(),
            backend = %artifact.metadata().backend,
            features = artifact.layout().len(),
            "Model artifact loaded successfully"
        );

        Ok(artifact)
    }

    /// Build an artifact from an already-parsed document
    pub fn build(
        &self,
        document: ArtifactDocument,
        source: Option<&Path>,
    ) -> Result<ModelArtifact, String> {
        let (parts, spec) = document.into_parts();
        let num_features = parts.feature_names.len();

        let model: Box<dyn FraudModel> = match spec {
            ModelSpec::TreeEnsemble(mut ensemble) => {
                ensemble
                    .validate(num_features)
                    .map_err(|e| format!("invalid tree ensemble: {}", e))?;
                Box::new(ensemble)
            }
            ModelSpec::Onnx { path } => self.load_onnx(source, &path, num_features)?,
        };

        ModelArtifact::new(parts, model, source)
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(
        &self,
        source: Option<&Path>,
        path: &str,
        num_features: usize,
    ) -> Result<Box<dyn FraudModel>, String> {
        use crate::models::artifact::resolve_relative;
        use crate::models::onnx::OnnxModel;

        let model_path = match source {
            Some(artifact_path) => resolve_relative(artifact_path, path),
            None => std::path::PathBuf::from(path),
        };
        let model = OnnxModel::load(&model_path, num_features, self.onnx_threads)
            .map_err(|e| format!("failed to load ONNX model {}: {:#}", model_path.display(), e))?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(
        &self,
        _source: Option<&Path>,
        path: &str,
        _num_features: usize,
    ) -> Result<Box<dyn FraudModel>, String> {
        Err(format!(
            "artifact references ONNX model {} but this build has no `onnx` feature ({} threads requested)",
            path, self.onnx_threads
        ))
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SMALL_ARTIFACT: &str = r#"{
        "training_date": "2024-02-01T08:00:00",
        "model_type": "LightGBM",
        "random_state": 42,
        "feature_names": ["return_reason_suspicious", "user_age_days"],
        "feature_importance": [0.6, 0.4],
        "model": {
            "format": "tree_ensemble",
            "objective": "binary",
            "base_score": -1.0,
            "trees": [
                {"nodes": [
                    {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                    {"value": -0.4},
                    {"value": 1.2}
                ]}
            ]
        }
    }"#;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_tree_artifact() {
        let file = write_temp(SMALL_ARTIFACT);
        let artifact = ModelLoader::new().load(file.path()).unwrap();

        assert_eq!(artifact.version(), "2024-02-01T08:00:00");
        assert_eq!(artifact.feature_names().len(), 2);
        assert_eq!(artifact.model().backend(), "tree_ensemble");
        assert_eq!(
            artifact.metadata().source.as_deref(),
            Some(file.path().display().to_string().as_str())
        );
    }

    #[test]
    fn test_missing_file() {
        let err = ModelLoader::new()
            .load("/definitely/not/here/model.json")
            .unwrap_err();
        assert_eq!(err.kind(), "model_load_error");
    }

    #[test]
    fn test_corrupt_file() {
        let file = write_temp("{ this is not json");
        let err = ModelLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, ScoringError::ModelLoad { .. }));
    }

    #[test]
    fn test_tree_referencing_missing_feature() {
        let broken = SMALL_ARTIFACT.replace(r#""feature": 0"#, r#""feature": 7"#);
        let file = write_temp(&broken);
        let err = ModelLoader::new().load(file.path()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_artifact_without_feature() {
        let onnx = r#"{
            "training_date": "2024-02-01T08:00:00",
            "feature_names": ["user_age_days"],
            "model": {"format": "onnx", "path": "fraud.onnx"}
        }"#;
        let file = write_temp(onnx);
        let err = ModelLoader::new().load(file.path()).unwrap_err();
        assert!(err.to_string().contains("onnx"));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_onnx_path_resolved_next_to_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fraud.onnx"), b"not a graph").unwrap();
        let artifact_path = dir.path().join("model.json");
        std::fs::write(
            &artifact_path,
            r#"{
                "training_date": "2024-02-01T08:00:00",
                "feature_names": ["user_age_days"],
                "model": {"format": "onnx", "path": "fraud.onnx"}
            }"#,
        )
        .unwrap();

        let err = ModelLoader::with_threads(2).load(&artifact_path).unwrap_err();
        assert_eq!(err.kind(), "model_load_error");
        let message = err.to_string();
        assert!(message.contains("failed to load ONNX model"), "{}", message);
        assert!(message.contains("fraud.onnx"), "{}", message);
    }
}
