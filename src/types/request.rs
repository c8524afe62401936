//! Return request data structures and the feature field table

use crate::error::{ScoringError, ScoringResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a numeric field is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any finite value inside `[min, max]`
    Continuous,
    /// Binary indicator, exactly 0 or 1
    Flag,
}

/// Static description of one model-facing request field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Value used when the request omits the field
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl FieldSpec {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Declares the request struct, the field table and the accessors from one
/// list so that names, defaults and ranges can't drift apart.
macro_rules! return_request_fields {
    ($(
        $(#[$doc:meta])*
        $name:ident: $kind:ident = $default:expr, [$min:expr, $max:expr];
    )*) => {
        /// A return request as received from a transport.
        ///
        /// Every numeric field is optional on the wire; omitted fields are
        /// filled from [`FEATURE_FIELDS`] defaults when the request is
        /// validated. `user_id` and `order_id` are required.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct ReturnRequest {
            /// Unique user identifier
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub user_id: Option<String>,

            /// Order identifier
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub order_id: Option<String>,

            $(
                $(#[$doc])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $name: Option<f64>,
            )*
        }

        /// Every numeric field a model may consume, in canonical order.
        pub const FEATURE_FIELDS: &[FieldSpec] = &[
            $(
                FieldSpec {
                    name: stringify!($name),
                    kind: FieldKind::$kind,
                    default: $default,
                    min: $min,
                    max: $max,
                },
            )*
        ];

        impl ReturnRequest {
            /// Raw (unvalidated) value of a numeric field by name
            pub fn feature(&self, name: &str) -> Option<f64> {
                match name {
                    $( stringify!($name) => self.$name, )*
                    _ => None,
                }
            }

            /// Set a numeric field by name. Returns false for unknown names.
            pub fn set_feature(&mut self, name: &str, value: f64) -> bool {
                match name {
                    $(
                        stringify!($name) => {
                            self.$name = Some(value);
                            true
                        }
                    )*
                    _ => false,
                }
            }

            /// Raw values in [`FEATURE_FIELDS`] order
            pub fn feature_values(&self) -> [Option<f64>; FIELD_COUNT] {
                [ $( self.$name ),* ]
            }
        }
    };
}

const UNBOUNDED: f64 = f64::INFINITY;

return_request_fields! {
    // User history
    /// Account age in days
    user_age_days: Continuous = 30.0, [0.0, UNBOUNDED];
    /// Total number of orders
    num_orders: Continuous = 5.0, [0.0, UNBOUNDED];
    /// Average order value
    avg_order_value: Continuous = 100.0, [0.0, UNBOUNDED];
    /// Number of devices used
    device_count: Continuous = 1.0, [1.0, UNBOUNDED];
    /// Historical return rate
    return_rate: Continuous = 0.1, [0.0, 1.0];
    /// Returns in last 30 days
    recent_returns_30d: Continuous = 0.0, [0.0, UNBOUNDED];
    /// Returns in last 90 days
    recent_returns_90d: Continuous = 1.0, [0.0, UNBOUNDED];
    /// Returns in last 365 days
    recent_returns_365d: Continuous = 2.0, [0.0, UNBOUNDED];

    // Order
    /// Current order value
    order_value: Continuous = 150.0, [0.0, UNBOUNDED];
    /// Number of items in order
    item_count: Continuous = 2.0, [1.0, UNBOUNDED];
    /// Product category risk score
    product_risk_score: Continuous = 0.5, [0.0, 1.0];
    /// Express shipping flag
    shipping_method_express: Flag = 0.0, [0.0, 1.0];
    /// Billing/shipping address mismatch flag
    billing_shipping_mismatch: Flag = 0.0, [0.0, 1.0];

    // Return
    /// Days between delivery and return
    days_to_return: Continuous = 3.0, [0.0, UNBOUNDED];
    /// Suspicious return reason flag
    return_reason_suspicious: Flag = 0.0, [0.0, 1.0];
    /// Cash refund preference
    refund_type_cash: Flag = 0.0, [0.0, 1.0];
    /// Store credit preference
    refund_type_store_credit: Flag = 0.0, [0.0, 1.0];

    // Behavioral
    /// High value order flag
    is_high_value: Flag = 0.0, [0.0, 1.0];
    /// Suspicious email domain flag
    email_domain_risk: Flag = 0.0, [0.0, 1.0];
    /// Hour of return request
    hour_of_day: Continuous = 14.0, [0.0, 23.0];
    /// Weekend return flag
    is_weekend: Flag = 0.0, [0.0, 1.0];
}

/// Number of numeric request fields
pub const FIELD_COUNT: usize = FEATURE_FIELDS.len();

/// Position of a field in [`FEATURE_FIELDS`]
pub fn field_index(name: &str) -> Option<usize> {
    FEATURE_FIELDS.iter().position(|f| f.name == name)
}

/// Look up a field spec by name
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FEATURE_FIELDS.iter().find(|f| f.name == name)
}

impl ReturnRequest {
    /// Create a request with identifiers only; all numeric fields defaulted.
    pub fn new(user_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            order_id: Some(order_id.into()),
            ..Default::default()
        }
    }

    /// Builder-style numeric field setter. Unknown names are ignored.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set_feature(name, value);
        self
    }

    /// Parse a JSON object field by field, so a type error names the
    /// offending field. Unknown keys are ignored; `null` counts as omitted.
    pub fn from_json(value: &Value) -> ScoringResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ScoringError::validation("body", "expected a JSON object"))?;

        let mut request = Self::default();
        for (key, value) in object {
            match key.as_str() {
                "user_id" => request.user_id = identifier(key, value)?,
                "order_id" => request.order_id = identifier(key, value)?,
                name => {
                    if field_index(name).is_none() {
                        continue;
                    }
                    let number = match value {
                        Value::Null => continue,
                        Value::Number(n) => n.as_f64(),
                        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                        _ => None,
                    };
                    let number =
                        number.ok_or_else(|| ScoringError::validation(name, "expected a number"))?;
                    request.set_feature(name, number);
                }
            }
        }
        Ok(request)
    }

    /// Parse raw JSON bytes, as received from a queue
    pub fn from_slice(payload: &[u8]) -> ScoringResult<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ScoringError::validation("body", format!("malformed JSON: {e}")))?;
        Self::from_json(&value)
    }
}

fn identifier(field: &str, value: &Value) -> ScoringResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(ScoringError::validation(field, "expected a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_table() {
        assert_eq!(FIELD_COUNT, 21);
        assert_eq!(field_index("user_age_days"), Some(0));
        assert_eq!(field_index("is_weekend"), Some(20));
        assert_eq!(field_index("user_id"), None);

        let rate = field_spec("return_rate").unwrap();
        assert_eq!(rate.default, 0.1);
        assert!(rate.contains(1.0));
        assert!(!rate.contains(1.01));
        assert_eq!(field_spec("hour_of_day").unwrap().default, 14.0);

        for spec in FEATURE_FIELDS {
            assert!(spec.contains(spec.default), "{} default out of range", spec.name);
        }
    }

    #[test]
    fn test_wire_names_match_field_table() {
        let mut request = ReturnRequest::new("u", "o");
        for (i, spec) in FEATURE_FIELDS.iter().enumerate() {
            assert!(request.set_feature(spec.name, i as f64));
        }

        let json = serde_json::to_value(&request).unwrap();
        for (i, spec) in FEATURE_FIELDS.iter().enumerate() {
            assert_eq!(json[spec.name].as_f64(), Some(i as f64), "{}", spec.name);
        }
        assert_eq!(request.feature_values()[3], Some(3.0));
    }

    #[test]
    fn test_partial_deserialization() {
        let request: ReturnRequest = serde_json::from_str(
            r#"{"user_id": "user_1", "order_id": "order_1", "return_rate": 0.4, "is_weekend": 1}"#,
        )
        .unwrap();

        assert_eq!(request.user_id.as_deref(), Some("user_1"));
        assert_eq!(request.return_rate, Some(0.4));
        assert_eq!(request.is_weekend, Some(1.0));
        assert_eq!(request.hour_of_day, None);
        assert_eq!(request.feature("return_rate"), Some(0.4));
        assert_eq!(request.feature("unknown"), None);
    }

    #[test]
    fn test_from_json_names_bad_field() {
        let value = serde_json::json!({
            "user_id": "user_1",
            "order_id": "order_1",
            "order_value": "lots",
        });
        let err = ReturnRequest::from_json(&value).unwrap_err();
        assert_eq!(err.field(), Some("order_value"));

        let err = ReturnRequest::from_json(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.field(), Some("body"));
    }

    #[test]
    fn test_from_json_lenient_shapes() {
        let value = serde_json::json!({
            "user_id": "user_1",
            "order_id": 1234,
            "is_weekend": true,
            "hour_of_day": null,
            "channel": "web",
        });
        let request = ReturnRequest::from_json(&value).unwrap();
        assert_eq!(request.order_id.as_deref(), Some("1234"));
        assert_eq!(request.is_weekend, Some(1.0));
        assert_eq!(request.hour_of_day, None);
    }

    #[test]
    fn test_from_slice_malformed() {
        let err = ReturnRequest::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.field(), Some("body"));
    }

    #[test]
    fn test_unknown_field_rejected_by_setter() {
        let mut request = ReturnRequest::default();
        assert!(!request.set_feature("favourite_colour", 1.0));
    }
}
