//! Fraud Scoring Pipeline Library
//!
//! Scores individual payment transactions with a pre-trained model bundle:
//! raw fields are reconciled against the bundle's feature schema, categorical
//! columns are encoded with a fallback for unseen labels, and the scaled row
//! is classified into a fraud verdict.

pub mod config;
pub mod consumer;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod reconciler;
pub mod scorer;
pub mod types;

pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use error::{ArtifactLoadError, EvaluationError};
pub use models::{BundleStore, ModelBundle};
pub use pipeline::{evaluate, Pipeline};
pub use producer::ReportProducer;
pub use reconciler::FeatureReconciler;
pub use types::{Evaluation, RawTransactionInput, Verdict};
