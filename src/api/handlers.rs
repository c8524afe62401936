//! HTTP handlers

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::batch::BatchSummary;
use crate::error::{ErrorBody, ScoringError, ScoringResult};
use crate::metrics::MetricsSnapshot;
use crate::models::ArtifactMetadata;
use crate::monitor::{FeatureImportanceReport, HealthReport, MetricsReport};
use crate::types::alert::FlaggedReturn;
use crate::types::request::ReturnRequest;
use crate::types::score::ScoreResult;
use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub health: &'static str,
}

pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Return Fraud Scoring API",
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: state.monitor.health().model_loaded,
        health: "/health",
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.monitor.health())
}

pub async fn live() -> Json<Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// 503 until a model artifact is published
pub async fn ready(State(state): State<AppState>) -> ApiResult<Json<HealthReport>> {
    let report = state.monitor.health();
    if !report.model_loaded {
        return Err(ScoringError::ModelNotLoaded.into());
    }
    Ok(Json(report))
}

pub async fn score(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ScoreResult>> {
    let started = Instant::now();
    let request = ReturnRequest::from_slice(&body);
    let outcome = request.as_ref().map_err(Clone::clone).and_then(|r| state.scorer.score(r));
    state.metrics.record_outcome(started.elapsed(), &outcome);

    let result = outcome?;
    if let Ok(request) = &request {
        if result.is_flagged {
            publish_alerts(&state, vec![FlaggedReturn::for_request(request, &result)]).await;
        }
    }
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    #[serde(flatten)]
    pub result: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
    pub total_processed: usize,
    pub flagged_count: usize,
    pub failed_count: usize,
}

/// Score a JSON array of requests; malformed items fail alone.
pub async fn batch_score(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<BatchResponse>> {
    let items = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            return Err(ScoringError::validation("body", "expected a JSON array").into());
        }
        Err(e) => {
            return Err(ScoringError::validation("body", format!("malformed JSON: {e}")).into());
        }
    };

    let max = state.config.server.max_batch_size;
    if items.len() > max {
        return Err(ApiError::PayloadTooLarge(format!(
            "batch of {} exceeds the limit of {}",
            items.len(),
            max
        )));
    }

    let started = Instant::now();
    let parsed: Vec<ScoringResult<ReturnRequest>> =
        items.iter().map(ReturnRequest::from_json).collect();
    let outcomes = state.batch.score_parsed(parsed.clone());
    let latency = started.elapsed() / outcomes.len().max(1) as u32;
    for outcome in &outcomes {
        state.metrics.record_outcome(latency, outcome);
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    let mut alerts = Vec::new();
    let results = outcomes
        .into_iter()
        .zip(parsed.iter().zip(&items))
        .enumerate()
        .map(|(index, (outcome, (request, raw)))| {
            let (user_id, order_id) = match request {
                Ok(r) => (r.user_id.clone(), r.order_id.clone()),
                Err(_) => (raw_id(raw, "user_id"), raw_id(raw, "order_id")),
            };
            match outcome {
                Ok(result) => {
                    if let (true, Ok(request)) = (result.is_flagged, request) {
                        alerts.push(FlaggedReturn::for_request(request, &result));
                    }
                    BatchItem {
                        index,
                        user_id,
                        order_id,
                        result: Some(result),
                        error: None,
                    }
                }
                Err(e) => BatchItem {
                    index,
                    user_id,
                    order_id,
                    result: None,
                    error: Some(e.to_body()),
                },
            }
        })
        .collect();

    publish_alerts(&state, alerts).await;

    Ok(Json(BatchResponse {
        results,
        total_processed: summary.total_processed,
        flagged_count: summary.flagged_count,
        failed_count: summary.failed_count,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<Json<MetricsReport>> {
    Ok(Json(state.monitor.metrics()?))
}

pub async fn feature_importance(
    State(state): State<AppState>,
) -> ApiResult<Json<FeatureImportanceReport>> {
    Ok(Json(state.monitor.feature_importance()?))
}

pub async fn stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    /// Artifact to load; the configured path when absent
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub model: ArtifactMetadata,
}

/// Load an artifact and publish it. The previous artifact keeps serving on
/// failure.
pub async fn reload(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReloadResponse>> {
    let request: ReloadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReloadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid reload request: {e}")))?
    };
    let path = request
        .path
        .unwrap_or_else(|| state.config.models.artifact_path.clone());

    info!(path = %path, "Model reload requested");
    let holder = Arc::clone(state.scorer.holder());
    let artifact = tokio::task::spawn_blocking(move || holder.reload(path))
        .await
        .map_err(|e| ApiError::Internal(format!("reload task failed: {e}")))??;

    Ok(Json(ReloadResponse {
        status: "reloaded",
        model: artifact.metadata().clone(),
    }))
}

fn raw_id(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

async fn publish_alerts(state: &AppState, alerts: Vec<FlaggedReturn>) {
    if alerts.is_empty() {
        return;
    }
    match &state.alerts {
        Some(producer) => producer.publish_batch(&alerts).await,
        None => {
            for alert in &alerts {
                warn!(
                    alert_id = %alert.alert_id,
                    order_id = %alert.order_id,
                    risk_score = alert.risk_score,
                    "Return flagged for review"
                );
            }
        }
    }
}
