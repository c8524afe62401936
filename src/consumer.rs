//! NATS consumer for queued return requests

use crate::error::ScoringResult;
use crate::metrics::ScoringMetrics;
use crate::scorer::Scorer;
use crate::types::alert::FlaggedReturn;
use crate::types::request::ReturnRequest;
use crate::types::score::ScoreResult;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Subscribes to the return request subject
pub struct ReturnRequestConsumer {
    client: Client,
    subject: String,
}

impl ReturnRequestConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .context("Failed to subscribe to return request subject")?;
        info!(subject = %self.subject, "Subscribed to return request subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Result of handling one queued message
#[derive(Debug)]
pub struct ProcessedMessage {
    pub order_id: Option<String>,
    pub outcome: ScoringResult<ScoreResult>,
    /// Alert to publish when the return was flagged
    pub alert: Option<FlaggedReturn>,
    pub latency: Duration,
}

impl ProcessedMessage {
    /// Reply payload: the score, or the error body on failure
    pub fn reply_payload(&self) -> serde_json::Result<Vec<u8>> {
        match &self.outcome {
            Ok(result) => serde_json::to_vec(result),
            Err(e) => serde_json::to_vec(&e.to_body()),
        }
    }
}

/// Turns raw message payloads into scores and alerts.
///
/// Transport-free so the same path runs under tests.
#[derive(Clone)]
pub struct RequestProcessor {
    scorer: Arc<Scorer>,
    metrics: Arc<ScoringMetrics>,
}

impl RequestProcessor {
    pub fn new(scorer: Arc<Scorer>, metrics: Arc<ScoringMetrics>) -> Self {
        Self { scorer, metrics }
    }

    pub fn process(&self, payload: &[u8]) -> ProcessedMessage {
        let started = Instant::now();
        let request = ReturnRequest::from_slice(payload);
        let order_id = request.as_ref().ok().and_then(|r| r.order_id.clone());

        let outcome = request
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|r| self.scorer.score(r));
        let latency = started.elapsed();
        self.metrics.record_outcome(latency, &outcome);

        let alert = match (&request, &outcome) {
            (Ok(request), Ok(result)) if result.is_flagged => {
                Some(FlaggedReturn::for_request(request, result))
            }
            _ => None,
        };

        ProcessedMessage {
            order_id,
            outcome,
            alert,
            latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::error::ErrorBody;
    use crate::models::{ArtifactDocument, ModelHolder, ModelLoader};
    use std::sync::atomic::Ordering;

    fn processor() -> (RequestProcessor, Arc<ScoringMetrics>) {
        let document: ArtifactDocument = serde_json::from_str(
            r#"{
                "training_date": "v1",
                "feature_names": ["return_reason_suspicious"],
                "feature_importance": [1.0],
                "model": {"format": "tree_ensemble", "trees": [{"nodes": [
                    {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                    {"value": -2.0},
                    {"value": 2.0}
                ]}]}
            }"#,
        )
        .unwrap();
        let artifact = ModelLoader::new().build(document, None).unwrap();
        let holder = Arc::new(ModelHolder::with_artifact(ModelLoader::new(), artifact));
        let scorer = Arc::new(Scorer::new(holder, &ScoringConfig::default()));
        let metrics = Arc::new(ScoringMetrics::new());
        (RequestProcessor::new(scorer, Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn test_flagged_message_yields_alert() {
        let (processor, metrics) = processor();
        let processed = processor.process(
            br#"{"user_id": "user_9", "order_id": "order_9", "return_reason_suspicious": 1}"#,
        );

        let result = processed.outcome.as_ref().unwrap();
        assert!(result.is_flagged);
        let alert = processed.alert.as_ref().unwrap();
        assert_eq!(alert.order_id, "order_9");
        assert_eq!(alert.user_id, "user_9");
        assert_eq!(alert.risk_score, result.risk_score);
        assert_eq!(metrics.requests_flagged.load(Ordering::Relaxed), 1);

        let reply: ScoreResult = serde_json::from_slice(&processed.reply_payload().unwrap()).unwrap();
        assert!((reply.risk_score - result.risk_score).abs() < 1e-12);
        assert_eq!(reply.model_version, "v1");
    }

    #[test]
    fn test_clean_message_has_no_alert() {
        let (processor, _) = processor();
        let processed = processor.process(br#"{"user_id": "u", "order_id": "o"}"#);
        assert!(!processed.outcome.unwrap().is_flagged);
        assert!(processed.alert.is_none());
    }

    #[test]
    fn test_malformed_message_replies_with_error() {
        let (processor, metrics) = processor();
        let processed = processor.process(b"not json");

        assert!(processed.alert.is_none());
        let body: ErrorBody = serde_json::from_slice(&processed.reply_payload().unwrap()).unwrap();
        assert_eq!(body.kind, "validation_error");
        assert_eq!(body.status_code, 422);
        assert_eq!(metrics.snapshot().failures_by_kind["validation_error"], 1);
    }
}
