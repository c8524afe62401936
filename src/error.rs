//! Error taxonomy for the scoring core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by feature building, model loading and scoring.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    /// Missing or malformed input field. Correctable by the caller.
    #[error("invalid field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// No model artifact has been published yet.
    #[error("model not loaded")]
    ModelNotLoaded,

    /// Artifact missing, unreadable or structurally invalid.
    #[error("failed to load model artifact from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    /// Unexpected failure inside the model call.
    #[error("inference failed (input digest {digest}): {reason}")]
    Inference { digest: String, reason: String },
}

impl ScoringError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn model_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Validation { .. } => "validation_error",
            ScoringError::ModelNotLoaded => "model_not_loaded",
            ScoringError::ModelLoad { .. } => "model_load_error",
            ScoringError::Inference { .. } => "inference_error",
        }
    }

    /// Whether the caller may retry the same request after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoringError::ModelNotLoaded)
    }

    /// Offending field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            ScoringError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;

/// Wire form of an error, shared by every transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, kind: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
            field: None,
            status_code,
            timestamp: Utc::now(),
        }
    }
}

impl ScoringError {
    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            ScoringError::Validation { .. } => 422,
            ScoringError::ModelNotLoaded => 503,
            ScoringError::ModelLoad { .. } | ScoringError::Inference { .. } => 500,
        }
    }

    /// Caller-facing body. Inference details stay in the logs.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ScoringError::Inference { digest, .. } => {
                format!("inference failed (input digest {digest})")
            }
            other => other.to_string(),
        };
        ErrorBody {
            field: self.field().map(str::to_string),
            ..ErrorBody::new(message, self.kind(), self.status_code())
        }
    }
}
