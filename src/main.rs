//! Return Fraud Scoring Service - Main Entry Point
//!
//! Loads the model artifact, serves the scoring API over HTTP and, when
//! enabled, scores return requests queued on NATS.

use anyhow::{Context, Result};
use futures::StreamExt;
use return_fraud_scoring::{
    api::{create_router, AppState},
    config::AppConfig,
    consumer::{RequestProcessor, ReturnRequestConsumer},
    logging::init_logging,
    metrics::{MetricsReporter, ScoringMetrics},
    models::{ModelHolder, ModelLoader},
    producer::FlaggedReturnProducer,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Return Fraud Scoring Service");
    info!(
        fraud_threshold = config.scoring.fraud_threshold,
        top_n = config.scoring.top_n,
        out_of_range = ?config.scoring.out_of_range,
        "Configuration loaded successfully"
    );

    let holder = Arc::new(ModelHolder::new(ModelLoader::with_threads(
        config.models.onnx_threads,
    )));
    match holder.reload(&config.models.artifact_path) {
        Ok(artifact) => info!(
            version = %artifact.version(),
            features = artifact.feature_names().len(),
            backend = %artifact.metadata().backend,
            "Model artifact loaded"
        ),
        Err(e) if config.models.require_on_startup => {
            return Err(e).context("Model artifact is required on startup");
        }
        Err(e) => warn!(
            error = %e,
            "Starting without a model; scoring returns 503 until a reload succeeds"
        ),
    }

    let metrics = Arc::new(ScoringMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut state = AppState::new(holder, config.clone(), metrics.clone());

    if config.nats.enabled {
        let client = async_nats::connect(&config.nats.url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
        info!("Connected to NATS at {}", config.nats.url);

        let producer = FlaggedReturnProducer::new(client.clone(), &config.nats.flagged_subject);
        state = state.with_alerts(producer.clone());

        let consumer = ReturnRequestConsumer::new(client, &config.nats.request_subject);
        let processor = RequestProcessor::new(state.scorer.clone(), metrics.clone());
        let workers = config.pipeline.workers;
        tokio::spawn(async move {
            if let Err(e) = run_queue(consumer, processor, producer, workers).await {
                error!(error = %e, "Queue consumer stopped");
            }
        });
    }

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

/// Score queued requests with at most `workers` in flight
async fn run_queue(
    consumer: ReturnRequestConsumer,
    processor: RequestProcessor,
    producer: FlaggedReturnProducer,
    workers: usize,
) -> Result<()> {
    info!(
        "Starting return request processing loop with {} parallel workers",
        workers
    );
    info!("Listening on subject: {}", consumer.subject());
    info!("Publishing flagged returns to: {}", producer.subject());

    let semaphore = Arc::new(Semaphore::new(workers));
    let processed_count = Arc::new(AtomicU64::new(0));
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let processor = processor.clone();
        let producer = producer.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let processed = processor.process(&message.payload);

            match &processed.outcome {
                Ok(result) => debug!(
                    order_id = ?processed.order_id,
                    risk_score = result.risk_score,
                    is_flagged = result.is_flagged,
                    processing_time_us = processed.latency.as_micros(),
                    "Return request processed"
                ),
                Err(e) => warn!(
                    order_id = ?processed.order_id,
                    kind = e.kind(),
                    error = %e,
                    "Return request failed"
                ),
            }

            if let Some(alert) = &processed.alert {
                match producer.publish(alert).await {
                    Ok(()) => info!(
                        alert_id = %alert.alert_id,
                        order_id = %alert.order_id,
                        risk_score = alert.risk_score,
                        "Flagged return published"
                    ),
                    Err(e) => error!(
                        order_id = %alert.order_id,
                        error = %e,
                        "Failed to publish flagged return"
                    ),
                }
            }

            if let Some(reply) = message.reply.clone() {
                let sent = match processed.reply_payload() {
                    Ok(payload) => producer.reply(reply, payload).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = sent {
                    error!(order_id = ?processed.order_id, error = %e, "Failed to send reply");
                }
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(processed = count, "Processing milestone");
            }

            drop(permit);
        });
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
