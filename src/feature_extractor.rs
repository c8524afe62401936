//! Feature vector building for return fraud model inference.
//!
//! Requests are validated once at the boundary into a [`ValidatedReturn`]
//! holding every numeric field in canonical order, then projected into the
//! exact feature order the loaded artifact was trained on.

use crate::error::{ScoringError, ScoringResult};
use crate::types::request::{
    field_index, FieldKind, ReturnRequest, FEATURE_FIELDS, FIELD_COUNT,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// What to do with a numeric value outside its physical range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Clamp into range and log the adjustment
    #[default]
    Clamp,
    /// Fail with a validation error naming the field
    Reject,
}

/// A request whose identifiers are present and whose numeric fields are
/// default-filled and in range.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReturn {
    pub user_id: String,
    pub order_id: String,
    values: [f64; FIELD_COUNT],
}

impl ValidatedReturn {
    /// Value of the field at `index` in [`FEATURE_FIELDS`]
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// All values in [`FEATURE_FIELDS`] order
    pub fn values(&self) -> &[f64; FIELD_COUNT] {
        &self.values
    }
}

/// Mapping from a model's feature order to request field positions.
///
/// Resolved once when an artifact is loaded, so projection at request time
/// cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    names: Vec<String>,
    indices: Vec<usize>,
}

impl FeatureLayout {
    /// Resolve an ordered list of model feature names against the request fields
    pub fn resolve(names: &[String]) -> Result<Self, String> {
        if names.is_empty() {
            return Err("feature list is empty".to_string());
        }

        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let index = field_index(name)
                .ok_or_else(|| format!("unknown feature `{}`", name))?;
            if indices.contains(&index) {
                return Err(format!("duplicate feature `{}`", name));
            }
            indices.push(index);
        }

        Ok(Self {
            names: names.to_vec(),
            indices,
        })
    }

    /// Layout using every request field in canonical order
    pub fn canonical() -> Self {
        Self {
            names: FEATURE_FIELDS.iter().map(|f| f.name.to_string()).collect(),
            indices: (0..FIELD_COUNT).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Request field position for each model feature
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Ordered model input
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short SHA-256 digest of the vector, safe to log in place of the values
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for value in &self.0 {
            hasher.update(value.to_le_bytes());
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

/// Validates requests and builds model-ordered feature vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorBuilder {
    policy: OutOfRangePolicy,
}

impl FeatureVectorBuilder {
    pub fn new(policy: OutOfRangePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    /// Check identifiers, fill defaults and enforce field ranges.
    pub fn validate(&self, request: &ReturnRequest) -> ScoringResult<ValidatedReturn> {
        let user_id = required_id("user_id", request.user_id.as_deref())?;
        let order_id = required_id("order_id", request.order_id.as_deref())?;

        let mut values = [0.0; FIELD_COUNT];
        for ((slot, spec), raw) in values
            .iter_mut()
            .zip(FEATURE_FIELDS)
            .zip(request.feature_values())
        {
            let Some(raw) = raw else {
                *slot = spec.default;
                continue;
            };

            if !raw.is_finite() {
                return Err(ScoringError::validation(spec.name, "value is not a finite number"));
            }

            let in_domain = spec.contains(raw)
                && (spec.kind != FieldKind::Flag || raw == 0.0 || raw == 1.0);
            if in_domain {
                *slot = raw;
                continue;
            }

            match self.policy {
                OutOfRangePolicy::Reject => {
                    return Err(ScoringError::validation(
                        spec.name,
                        out_of_range_reason(spec.kind, raw, spec.min, spec.max),
                    ));
                }
                OutOfRangePolicy::Clamp => {
                    let mut clamped = raw.clamp(spec.min, spec.max);
                    if spec.kind == FieldKind::Flag {
                        clamped = clamped.round();
                    }
                    warn!(
                        order_id = %order_id,
                        field = spec.name,
                        original = raw,
                        clamped = clamped,
                        "Clamped out-of-range request field"
                    );
                    *slot = clamped;
                }
            }
        }

        Ok(ValidatedReturn {
            user_id,
            order_id,
            values,
        })
    }

    /// Order validated values per the model's feature layout.
    pub fn project(&self, validated: &ValidatedReturn, layout: &FeatureLayout) -> FeatureVector {
        FeatureVector(
            layout
                .indices()
                .iter()
                .map(|&index| validated.value(index))
                .collect(),
        )
    }

    /// Validate and project in one step.
    pub fn build(
        &self,
        request: &ReturnRequest,
        layout: &FeatureLayout,
    ) -> ScoringResult<(ValidatedReturn, FeatureVector)> {
        let validated = self.validate(request)?;
        let vector = self.project(&validated, layout);
        Ok((validated, vector))
    }
}

fn required_id(field: &str, value: Option<&str>) -> ScoringResult<String> {
    match value.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        Some(_) => Err(ScoringError::validation(field, "must not be empty")),
        None => Err(ScoringError::validation(field, "missing required field")),
    }
}

fn out_of_range_reason(kind: FieldKind, value: f64, min: f64, max: f64) -> String {
    match kind {
        FieldKind::Flag => format!("value {} is not 0 or 1", value),
        FieldKind::Continuous if max.is_infinite() => {
            format!("value {} below minimum {}", value, min)
        }
        FieldKind::Continuous => format!("value {} outside [{}, {}]", value, min, max),
    }
}
