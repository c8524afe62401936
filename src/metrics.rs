//! Runtime statistics for the scoring service.

use crate::error::ScoringResult;
use crate::types::score::ScoreResult;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for scoring traffic
pub struct ScoringMetrics {
    /// Requests scored successfully
    pub requests_scored: AtomicU64,
    /// Scored requests at or above the fraud threshold
    pub requests_flagged: AtomicU64,
    /// Requests that failed to score
    pub requests_failed: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Scoring latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            requests_scored: AtomicU64::new(0),
            requests_flagged: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful score
    pub fn record_score(&self, latency: Duration, risk_score: f64, flagged: bool) {
        self.requests_scored.fetch_add(1, Ordering::Relaxed);
        if flagged {
            self.requests_flagged.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut latencies = self.latencies.write();
            latencies.push(latency.as_micros() as u64);
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }

        let bucket = (risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        self.score_buckets.write()[bucket] += 1;
    }

    /// Record a failed score by error kind
    pub fn record_failure(&self, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        *self
            .failures_by_kind
            .write()
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Record the outcome of one scoring call
    pub fn record_outcome(&self, latency: Duration, outcome: &ScoringResult<ScoreResult>) {
        match outcome {
            Ok(result) => self.record_score(latency, result.risk_score, result.is_flagged),
            Err(e) => self.record_failure(e.kind()),
        }
    }

    /// Latency percentiles over the retained window
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self.latencies.read().clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests scored per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    pub fn get_failures_by_kind(&self) -> BTreeMap<String, u64> {
        self.failures_by_kind.read().clone()
    }

    /// Point-in-time view for the stats endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        let scored = self.requests_scored.load(Ordering::Relaxed);
        let flagged = self.requests_flagged.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_scored: scored,
            requests_flagged: flagged,
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            flag_rate: if scored > 0 {
                flagged as f64 / scored as f64
            } else {
                0.0
            },
            throughput_per_sec: self.get_throughput(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            latency: self.get_processing_stats(),
            score_distribution: self.get_score_distribution(),
            failures_by_kind: self.get_failures_by_kind(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let latency = &snapshot.latency;

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          RETURN FRAUD SCORING - METRICS SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Scored: {:>8}  │  Throughput: {:>6.1} req/s       ║",
            snapshot.requests_scored, snapshot.throughput_per_sec
        );
        info!(
            "║ Flagged:         {:>8}  │  Flag Rate:  {:>6.1}%            ║",
            snapshot.requests_flagged,
            snapshot.flag_rate * 100.0
        );
        info!(
            "║ Failed:          {:>8}                                    ║",
            snapshot.requests_failed
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}       ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        if !snapshot.failures_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &snapshot.failures_by_kind {
                info!("║   {:18}: {:>6}                                  ║", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = snapshot.score_distribution.iter().sum();
        for (i, &count) in snapshot.score_distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_scored: u64,
    pub requests_flagged: u64,
    pub requests_failed: u64,
    pub flag_rate: f64,
    pub throughput_per_sec: f64,
    pub uptime_secs: u64,
    pub latency: ProcessingStats,
    pub score_distribution: [u64; 10],
    pub failures_by_kind: BTreeMap<String, u64>,
}

/// Periodic summary printer
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
