//! Fraud Scoring Service - Main Entry Point
//!
//! Consumes raw transactions from NATS, scores each one against the active
//! model bundle, and publishes a verdict or a rejection for every message.

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    consumer::{decode as decode_transaction, TransactionConsumer},
    metrics::{MetricsReporter, PipelineMetrics},
    models::{BundleStore, FileSource},
    pipeline::Pipeline,
    producer::ReportProducer,
    types::{RejectionReport, VerdictReport},
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    init_logging(&config.logging)?;
    info!(path = %config_path, "Starting Fraud Scoring Service");

    // Load the model bundle; the service refuses to start without one
    let source = FileSource::new(&config.bundle.manifest_path);
    let store = Arc::new(
        BundleStore::open(&source, config.bundle.load_options())
            .context("Failed to load model bundle")?,
    );
    let summary = store.current().describe();
    info!(
        version = ?summary.version,
        features = ?summary.features,
        encoded_columns = ?summary.encoded_columns,
        classifier = summary.classifier,
        supports_probability = summary.supports_probability,
        "Model bundle loaded"
    );

    let pipeline = Pipeline::new(store.clone());
    let metrics = Arc::new(PipelineMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let producer = Arc::new(ReportProducer::new(
        client.clone(),
        &config.nats.verdict_subject,
        &config.nats.rejection_subject,
    ));

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    if config.bundle.refresh_interval_secs > 0 {
        tokio::spawn(refresh_loop(
            store.clone(),
            source.clone(),
            Duration::from_secs(config.bundle.refresh_interval_secs),
        ));
    }

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        subject = %consumer.subject(),
        verdicts = %producer.verdict_subject(),
        rejections = %producer.rejection_subject(),
        "Starting transaction processing loop"
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let raw = match decode_transaction(&message) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize transaction");
                    metrics.record_undecodable();
                    let report = RejectionReport::undecodable(&e);
                    if let Err(e) = producer.publish_rejection(&report).await {
                        error!(error = %e, "Failed to publish rejection");
                    }
                    drop(permit);
                    return;
                }
            };
            let tx_id = raw.transaction_id();

            let start_time = Instant::now();
            let (bundle, outcome) = pipeline.evaluate(&raw);
            let elapsed = start_time.elapsed();

            match outcome {
                Ok(evaluation) => {
                    metrics.record_evaluation(elapsed, &evaluation);

                    for anomaly in &evaluation.anomalies {
                        debug!(transaction_id = ?tx_id, anomaly = %anomaly, "Degraded input");
                    }
                    if evaluation.verdict.is_fraud {
                        info!(
                            transaction_id = ?tx_id,
                            probability = ?evaluation.verdict.probability,
                            anomalies = evaluation.anomalies.len(),
                            processing_time_us = elapsed.as_micros() as u64,
                            "Fraud verdict"
                        );
                    }

                    let report = VerdictReport::new(tx_id.clone(), evaluation)
                        .with_bundle_version(bundle.metadata().version.clone());
                    if let Err(e) = producer.publish_verdict(&report).await {
                        error!(transaction_id = ?tx_id, error = %e, "Failed to publish verdict");
                    }
                }
                Err(e) => {
                    metrics.record_failure(&e);
                    warn!(
                        transaction_id = ?tx_id,
                        kind = e.kind(),
                        error = %e,
                        "Transaction rejected"
                    );

                    let report = RejectionReport::new(tx_id.clone(), &e);
                    if let Err(e) = producer.publish_rejection(&report).await {
                        error!(transaction_id = ?tx_id, error = %e, "Failed to publish rejection");
                    }
                }
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let latency = metrics.latency_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} tx/s", metrics.throughput()),
                    avg_latency_us = latency.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level {:?}", logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

/// Periodically reload the bundle; a failed reload keeps the current one.
async fn refresh_loop(store: Arc<BundleStore>, source: FileSource, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;

        let store = store.clone();
        let source = source.clone();
        match tokio::task::spawn_blocking(move || store.refresh(&source)).await {
            Ok(Ok(bundle)) => debug!(version = ?bundle.metadata().version, "Bundle refresh done"),
            Ok(Err(e)) => warn!(error = %e, "Bundle refresh failed, keeping current bundle"),
            Err(e) => error!(error = %e, "Bundle refresh task panicked"),
        }
    }
}
