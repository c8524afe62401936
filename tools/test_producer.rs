//! Test Return Request Producer
//!
//! Generates synthetic return requests and publishes them to NATS for
//! exercising the scoring service end to end.
//!
//! Usage: `test-producer [nats_url] [subject] [count] [fraud_rate] [delay_ms]`

use rand::Rng;
use return_fraud_scoring::ReturnRequest;
use std::time::Duration;
use tracing::{info, warn};

/// Return request generator with legitimate and suspicious profiles
struct ReturnRequestGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
}

impl ReturnRequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
        }
    }

    fn ids(&mut self) -> (String, String) {
        self.counter += 1;
        (
            format!("user_{}", self.rng.gen_range(100_000..1_000_000)),
            format!("order_{:09}", self.counter),
        )
    }

    fn flag(&mut self, p: f64) -> f64 {
        if self.rng.gen_bool(p) {
            1.0
        } else {
            0.0
        }
    }

    /// Established customer, ordinary return
    fn generate_legitimate(&mut self) -> ReturnRequest {
        let (user_id, order_id) = self.ids();
        let order_value = self.rng.gen_range(10.0..400.0);
        let cash = self.flag(0.3);

        ReturnRequest::new(user_id, order_id)
            .with("user_age_days", self.rng.gen_range(60..1000) as f64)
            .with("num_orders", self.rng.gen_range(3..50) as f64)
            .with("avg_order_value", self.rng.gen_range(20.0..300.0))
            .with("device_count", self.rng.gen_range(1..3) as f64)
            .with("return_rate", self.rng.gen_range(0.0..0.25))
            .with("recent_returns_30d", self.rng.gen_range(0..2) as f64)
            .with("recent_returns_90d", self.rng.gen_range(0..4) as f64)
            .with("recent_returns_365d", self.rng.gen_range(0..8) as f64)
            .with("order_value", order_value)
            .with("item_count", self.rng.gen_range(1..5) as f64)
            .with("product_risk_score", self.rng.gen_range(0.0..0.6))
            .with("shipping_method_express", self.flag(0.2))
            .with("billing_shipping_mismatch", self.flag(0.05))
            .with("days_to_return", self.rng.gen_range(3..30) as f64)
            .with("return_reason_suspicious", self.flag(0.05))
            .with("refund_type_cash", cash)
            .with("refund_type_store_credit", 1.0 - cash)
            .with("is_high_value", if order_value > 300.0 { 1.0 } else { 0.0 })
            .with("email_domain_risk", self.flag(0.05))
            .with("hour_of_day", self.rng.gen_range(8..22) as f64)
            .with("is_weekend", self.flag(0.3))
    }

    /// New account, high value, fast cash refund
    fn generate_suspicious(&mut self) -> ReturnRequest {
        let (user_id, order_id) = self.ids();

        ReturnRequest::new(user_id, order_id)
            .with("user_age_days", self.rng.gen_range(1..15) as f64)
            .with("num_orders", self.rng.gen_range(1..4) as f64)
            .with("avg_order_value", self.rng.gen_range(300.0..1000.0))
            .with("device_count", self.rng.gen_range(2..6) as f64)
            .with("return_rate", self.rng.gen_range(0.4..1.0))
            .with("recent_returns_30d", self.rng.gen_range(3..10) as f64)
            .with("recent_returns_90d", self.rng.gen_range(5..20) as f64)
            .with("recent_returns_365d", self.rng.gen_range(10..50) as f64)
            .with("order_value", self.rng.gen_range(500.0..3000.0))
            .with("item_count", self.rng.gen_range(1..10) as f64)
            .with("product_risk_score", self.rng.gen_range(0.6..1.0))
            .with("shipping_method_express", self.flag(0.8))
            .with("billing_shipping_mismatch", self.flag(0.7))
            .with("days_to_return", self.rng.gen_range(0..3) as f64)
            .with("return_reason_suspicious", self.flag(0.8))
            .with("refund_type_cash", 1.0)
            .with("refund_type_store_credit", 0.0)
            .with("is_high_value", 1.0)
            .with("email_domain_risk", self.flag(0.7))
            .with("hour_of_day", self.rng.gen_range(0..6) as f64)
            .with("is_weekend", self.flag(0.5))
    }

    fn generate(&mut self, fraud_rate: f64) -> (ReturnRequest, bool) {
        if self.rng.gen_bool(fraud_rate) {
            (self.generate_suspicious(), true)
        } else {
            (self.generate_legitimate(), false)
        }
    }
}

/// Fraction of suspicious requests, defaulting to 0.1 for missing or non-finite input
fn parse_fraud_rate(arg: Option<&str>) -> f64 {
    arg.and_then(|s| s.parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .unwrap_or(0.1)
        .clamp(0.0, 1.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Return Request Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("returns.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate = parse_fraud_rate(args.get(4).map(|s| s.as_str()));
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate, delay_ms).await;
        }
    };

    let mut generator = ReturnRequestGenerator::new();
    let mut legitimate_count = 0;
    let mut suspicious_count = 0;

    info!("Starting to publish {} return requests...", count);

    for i in 0..count {
        let (request, suspicious) = generator.generate(fraud_rate);
        if suspicious {
            suspicious_count += 1;
        } else {
            legitimate_count += 1;
        }

        let payload = serde_json::to_vec(&request)?;
        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} return requests ({} legitimate, {} suspicious)",
                i + 1,
                count,
                legitimate_count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;
    info!(
        "Completed! Published {} return requests ({} legitimate, {} suspicious)",
        count, legitimate_count, suspicious_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, fraud_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ReturnRequestGenerator::new();
    for i in 0..count {
        let (request, _) = generator.generate(fraud_rate);
        if (i + 1) % 10 == 0 || i == 0 {
            info!(
                "Sample return request {}:\n{}",
                i + 1,
                serde_json::to_string_pretty(&request)?
            );
        }
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraud_rate_argument() {
        assert_eq!(parse_fraud_rate(None), 0.1);
        assert_eq!(parse_fraud_rate(Some("0.25")), 0.25);
        assert_eq!(parse_fraud_rate(Some("7")), 1.0);
        assert_eq!(parse_fraud_rate(Some("-1")), 0.0);
        assert_eq!(parse_fraud_rate(Some("abc")), 0.1);
        for bad in ["NaN", "inf", "-inf"] {
            assert_eq!(parse_fraud_rate(Some(bad)), 0.1, "{}", bad);
        }
    }

    #[test]
    fn test_generated_rates_are_usable() {
        let mut generator = ReturnRequestGenerator::new();
        let rate = parse_fraud_rate(Some("NaN"));
        for _ in 0..50 {
            let (request, _) = generator.generate(rate);
            assert!(request.user_id.is_some());
        }
    }
}
