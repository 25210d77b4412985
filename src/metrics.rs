//! Performance and outcome statistics for the scoring service.

use crate::error::EvaluationError;
use crate::types::verdict::{Evaluation, UNDECODABLE_KIND};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is dropped
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for the scoring service
pub struct PipelineMetrics {
    /// Transactions scored successfully
    pub evaluations: AtomicU64,
    /// Verdicts with `is_fraud == true`
    pub fraud_verdicts: AtomicU64,
    /// Verdicts that carried at least one anomaly
    pub degraded_verdicts: AtomicU64,
    /// Anomalies by kind
    anomalies: RwLock<HashMap<&'static str, u64>>,
    /// Fatal evaluation errors and undecodable payloads by kind
    failures: RwLock<HashMap<&'static str, u64>>,
    /// Evaluation times (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            fraud_verdicts: AtomicU64::new(0),
            degraded_verdicts: AtomicU64::new(0),
            anomalies: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful evaluation
    pub fn record_evaluation(&self, elapsed: Duration, evaluation: &Evaluation) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if evaluation.verdict.is_fraud {
            self.fraud_verdicts.fetch_add(1, Ordering::Relaxed);
        }

        if evaluation.is_degraded() {
            self.degraded_verdicts.fetch_add(1, Ordering::Relaxed);
            let mut anomalies = self.anomalies.write().unwrap_or_else(PoisonError::into_inner);
            for anomaly in &evaluation.anomalies {
                *anomalies.entry(anomaly.kind()).or_insert(0) += 1;
            }
        }

        {
            let mut latencies = self.latencies.write().unwrap_or_else(PoisonError::into_inner);
            latencies.push(elapsed.as_micros() as u64);
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }

        if let Some(p) = evaluation.verdict.probability {
            let bucket = ((p * 10.0) as usize).min(9);
            self.probability_buckets
                .write()
                .unwrap_or_else(PoisonError::into_inner)[bucket] += 1;
        }
    }

    /// Record a fatal evaluation error
    pub fn record_failure(&self, error: &EvaluationError) {
        self.count_failure(error.kind());
    }

    /// Record a payload that could not be decoded into a transaction
    pub fn record_undecodable(&self) {
        self.count_failure(UNDECODABLE_KIND);
    }

    fn count_failure(&self, kind: &'static str) {
        let mut failures = self.failures.write().unwrap_or_else(PoisonError::into_inner);
        *failures.entry(kind).or_insert(0) += 1;
    }

    pub fn anomaly_counts(&self) -> HashMap<&'static str, u64> {
        self.anomalies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failure_counts(&self) -> HashMap<&'static str, u64> {
        self.failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        *self
            .probability_buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluation latency statistics
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = self
            .latencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Transactions per second since start
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.evaluations.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let evaluations = self.evaluations.load(Ordering::Relaxed);
        let fraud = self.fraud_verdicts.load(Ordering::Relaxed);
        let degraded = self.degraded_verdicts.load(Ordering::Relaxed);
        let rate = |n: u64| {
            if evaluations > 0 {
                n as f64 / evaluations as f64 * 100.0
            } else {
                0.0
            }
        };
        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             FRAUD SCORING PIPELINE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Evaluations: {:>8}  │  Throughput: {:>6.1} tx/s",
            evaluations,
            self.throughput()
        );
        info!("║ Fraud verdicts: {:>8} ({:>5.1}%)", fraud, rate(fraud));
        info!("║ Degraded verdicts: {:>5} ({:>5.1}%)", degraded, rate(degraded));
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (kind, count) in self.anomaly_counts() {
            info!("║ anomaly {:<20} {:>8}", kind, count);
        }
        for (kind, count) in self.failure_counts() {
            info!("║ failure {:<20} {:>8}", kind, count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        let distribution = self.probability_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 5.0) as usize).min(20));
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

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluation latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
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
