//! Type definitions for the return fraud scoring service

pub mod alert;
pub mod request;
pub mod score;

pub use alert::FlaggedReturn;
pub use request::{FieldKind, FieldSpec, ReturnRequest, FEATURE_FIELDS, FIELD_COUNT};
pub use score::{ImportanceCuts, RiskFactor, RiskLevel, RiskLevelCuts, ScoreResult};
