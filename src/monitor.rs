//! Health and model metadata reporting.
//!
//! Every call reads the holder's live artifact, so a reload is visible to the
//! very next call.

use crate::error::ScoringResult;
use crate::models::ModelHolder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// "healthy" when a model is loaded, "degraded" otherwise
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub model_version: String,
    pub training_date: String,
    pub feature_count: usize,
    pub random_state: Option<i64>,
    pub backend: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub model_info: ModelInfo,
    /// Most important first
    pub feature_importance: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportanceReport {
    pub feature_importance: Vec<FeatureImportance>,
    pub total_features: usize,
}

/// Read-only view over the model holder for dashboards and probes
#[derive(Clone)]
pub struct Monitor {
    holder: Arc<ModelHolder>,
}

impl Monitor {
    pub fn new(holder: Arc<ModelHolder>) -> Self {
        Self { holder }
    }

    pub fn health(&self) -> HealthReport {
        let current = self.holder.current().ok();
        HealthReport {
            status: if current.is_some() {
                "healthy"
            } else {
                "degraded"
            },
            model_loaded: current.is_some(),
            model_version: current.map(|artifact| artifact.version().to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Model metadata and ranked importance; `ModelNotLoaded` before any load
    pub fn metrics(&self) -> ScoringResult<MetricsReport> {
        let artifact = self.holder.current()?;
        let meta = artifact.metadata();
        Ok(MetricsReport {
            model_info: ModelInfo {
                model_type: meta.model_type.clone(),
                model_version: meta.version.clone(),
                training_date: meta.training_date.clone(),
                feature_count: artifact.feature_names().len(),
                random_state: meta.random_state,
                backend: meta.backend.clone(),
                loaded_at: meta.loaded_at,
            },
            feature_importance: ranked(&artifact.ranked_importance()),
        })
    }

    pub fn feature_importance(&self) -> ScoringResult<FeatureImportanceReport> {
        let artifact = self.holder.current()?;
        Ok(FeatureImportanceReport {
            feature_importance: ranked(&artifact.ranked_importance()),
            total_features: artifact.feature_names().len(),
        })
    }
}

fn ranked(pairs: &[(&str, f64)]) -> Vec<FeatureImportance> {
    pairs
        .iter()
        .map(|&(feature, importance)| FeatureImportance {
            feature: feature.to_string(),
            importance,
        })
        .collect()
}
