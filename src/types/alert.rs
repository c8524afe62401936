//! Alert published for flagged return requests

use crate::types::request::ReturnRequest;
use crate::types::score::{RiskFactor, ScoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert generated when a return request is flagged for review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedReturn {
    /// Unique alert identifier
    pub alert_id: String,

    /// User that requested the return
    pub user_id: String,

    /// Order being returned
    pub order_id: String,

    /// Fraud risk score (0.0 - 1.0)
    pub risk_score: f64,

    pub confidence: f64,

    /// Features that contributed most to the score
    pub top_risk_factors: Vec<RiskFactor>,

    /// Artifact version that produced the score
    pub model_version: String,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FlaggedReturn {
    /// Create an alert from a score result
    pub fn new(user_id: String, order_id: String, result: &ScoreResult) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            order_id,
            risk_score: result.risk_score,
            confidence: result.confidence,
            top_risk_factors: result.top_risk_factors.clone(),
            model_version: result.model_version.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Create an alert for a scored request, using its trimmed identifiers
    pub fn for_request(request: &ReturnRequest, result: &ScoreResult) -> Self {
        let id = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        Self::new(id(&request.user_id), id(&request.order_id), result)
    }
}
