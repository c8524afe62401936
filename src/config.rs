//! Configuration management for the return fraud scoring service

use crate::feature_extractor::OutOfRangePolicy;
use crate::types::score::RiskLevelCuts;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "RETURN_FRAUD_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub nats: NatsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Largest accepted `/batch_score` payload
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_ms: 5000,
            max_batch_size: 1000,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Path to the model artifact document
    pub artifact_path: String,
    /// Exit at startup when the artifact can't be loaded
    pub require_on_startup: bool,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            artifact_path: "models/return_fraud_model.json".to_string(),
            require_on_startup: false,
            onnx_threads: 1,
        }
    }
}

/// Scoring policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scores at or above this are flagged
    pub fraud_threshold: f64,
    /// Number of risk factors reported per score
    pub top_n: usize,
    /// Quantiles of global importance that separate risk levels
    pub risk_level_cuts: RiskLevelCuts,
    /// What to do with values outside a field's domain
    pub out_of_range: OutOfRangePolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fraud_threshold: 0.5,
            top_n: 5,
            risk_level_cuts: RiskLevelCuts::default(),
            out_of_range: OutOfRangePolicy::default(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent scoring tasks for queued requests
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    /// NATS server URL
    pub url: String,
    /// Subject for incoming return requests
    pub request_subject: String,
    /// Subject for outgoing flagged returns
    pub flagged_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            request_subject: "returns.requests".to_string(),
            flagged_subject: "returns.flagged".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between metrics summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from `RETURN_FRAUD_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file is fine; defaults apply and `RETURN_FRAUD__SECTION__KEY`
    /// environment variables override both.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("RETURN_FRAUD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the scorer can't honor
    pub fn validate(&self) -> Result<()> {
        let scoring = &self.scoring;
        if !(0.0..=1.0).contains(&scoring.fraud_threshold) {
            bail!(
                "scoring.fraud_threshold must be within [0, 1], got {}",
                scoring.fraud_threshold
            );
        }
        let cuts = scoring.risk_level_cuts;
        if !(0.0..=1.0).contains(&cuts.medium) || !(0.0..=1.0).contains(&cuts.high) {
            bail!("scoring.risk_level_cuts must be within [0, 1]");
        }
        if cuts.medium > cuts.high {
            bail!(
                "scoring.risk_level_cuts.medium ({}) exceeds high ({})",
                cuts.medium,
                cuts.high
            );
        }
        if scoring.top_n == 0 {
            bail!("scoring.top_n must be at least 1");
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        if self.server.max_batch_size == 0 {
            bail!("server.max_batch_size must be at least 1");
        }
        Ok(())
    }
}
