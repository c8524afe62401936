//! HTTP error responses

use crate::error::{ErrorBody, ScoringError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Seconds a client should wait before retrying while no model is loaded
const RETRY_AFTER_SECS: &str = "5";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Scoring(ScoringError),
    BadRequest(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl From<ScoringError> for ApiError {
    fn from(err: ScoringError) -> Self {
        ApiError::Scoring(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Scoring(err) => err.to_body(),
            ApiError::BadRequest(msg) => ErrorBody::new(msg.as_str(), "bad_request", 400),
            ApiError::PayloadTooLarge(msg) => ErrorBody::new(msg.as_str(), "payload_too_large", 413),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ErrorBody::new("Internal server error", "internal_error", 500)
            }
        };

        let status =
            StatusCode::from_u16(body.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::Scoring(ScoringError::ModelNotLoaded)) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }
}
