//! Configuration management for the fraud scoring service

use crate::models::bundle::LoadOptions;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub bundle: BundleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming raw transactions
    pub transaction_subject: String,
    /// Subject for outgoing verdict reports
    pub verdict_subject: String,
    /// Subject for transactions that could not be scored
    #[serde(default = "default_rejection_subject")]
    pub rejection_subject: String,
}

fn default_rejection_subject() -> String {
    "fraud.rejections".to_string()
}

/// Model bundle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    /// Path to the bundle manifest (JSON)
    pub manifest_path: String,
    /// Reload the bundle every N seconds (0 disables refresh)
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

impl BundleConfig {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            onnx_threads: self.onnx_threads.max(1),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of transactions evaluated concurrently
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between metrics summaries (0 disables the reporter)
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
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// Environment variables prefixed `FRAUD_SCORING` override file values,
    /// e.g. `FRAUD_SCORING__NATS__URL`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD_SCORING").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions".to_string(),
                verdict_subject: "fraud.verdicts".to_string(),
                rejection_subject: default_rejection_subject(),
            },
            bundle: BundleConfig {
                manifest_path: "models/bundle.json".to_string(),
                refresh_interval_secs: 0,
                onnx_threads: 1,
            },
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.verdict_subject, "fraud.verdicts");
        assert_eq!(config.bundle.refresh_interval_secs, 0);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.bundle.load_options().onnx_threads, 1);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[nats]
url = "nats://broker:4222"
transaction_subject = "tx.raw"
verdict_subject = "tx.verdicts"

[bundle]
manifest_path = "/srv/models/bundle.json"
refresh_interval_secs = 300
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.url, "nats://broker:4222");
        assert_eq!(config.nats.rejection_subject, "fraud.rejections");
        assert_eq!(config.bundle.refresh_interval_secs, 300);
        assert_eq!(config.bundle.onnx_threads, 1);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.metrics.report_interval_secs, 30);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(AppConfig::load_from_path("/no/such/config.toml").is_err());
    }
}
