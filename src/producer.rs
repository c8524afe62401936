//! NATS publisher for flagged returns and request replies

use crate::types::alert::FlaggedReturn;
use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, error};

/// Publishes flagged returns to NATS
#[derive(Clone)]
pub struct FlaggedReturnProducer {
    client: Client,
    subject: String,
}

impl FlaggedReturnProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a flagged return alert
    pub async fn publish(&self, alert: &FlaggedReturn) -> Result<()> {
        let payload = serde_json::to_vec(alert).context("Failed to serialize flagged return")?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish flagged return")?;

        debug!(
            alert_id = %alert.alert_id,
            order_id = %alert.order_id,
            risk_score = alert.risk_score,
            "Published flagged return"
        );

        Ok(())
    }

    /// Publish several alerts, logging and skipping individual failures
    pub async fn publish_batch(&self, alerts: &[FlaggedReturn]) {
        for alert in alerts {
            if let Err(e) = self.publish(alert).await {
                error!(
                    alert_id = %alert.alert_id,
                    error = %e,
                    "Failed to publish flagged return"
                );
            }
        }
    }

    /// Answer a request-reply message
    pub async fn reply(&self, reply_subject: async_nats::Subject, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(reply_subject, payload.into())
            .await
            .context("Failed to publish reply")
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
