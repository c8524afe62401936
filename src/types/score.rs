//! Scoring outcome data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level classification of a contributing feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from a global importance and absolute cut points
    pub fn from_importance(importance: f64, cuts: &ImportanceCuts) -> Self {
        if importance >= cuts.high {
            RiskLevel::High
        } else if importance >= cuts.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Configurable risk level cut points, expressed as quantiles of the
/// model's global feature-importance distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevelCuts {
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskLevelCuts {
    fn default() -> Self {
        Self {
            medium: 1.0 / 3.0,
            high: 2.0 / 3.0,
        }
    }
}

/// Cut points resolved to absolute importance values for one artifact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceCuts {
    pub medium: f64,
    pub high: f64,
}

/// One entry of the per-prediction explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Model feature name
    pub feature: String,
    /// Observed (validated) value
    pub value: f64,
    /// Instance-weighted importance used for ranking
    pub importance: f64,
    pub risk_level: RiskLevel,
}

/// Fraud score for a single return request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Fraud risk score (0.0 - 1.0)
    pub risk_score: f64,

    /// Whether the return is flagged for review
    pub is_flagged: bool,

    /// Distance from the decision boundary, rescaled to [0, 1]
    pub confidence: f64,

    /// Top contributing risk factors, importance descending
    pub top_risk_factors: Vec<RiskFactor>,

    /// Version of the artifact that produced the score
    pub model_version: String,

    /// Prediction timestamp
    pub timestamp: DateTime<Utc>,
}

impl ScoreResult {
    /// Confidence for a probability: 0 at 0.5, 1 at either extreme.
    pub fn confidence_for(risk_score: f64) -> f64 {
        (2.0 * (risk_score - 0.5).abs()).min(1.0)
    }
}
