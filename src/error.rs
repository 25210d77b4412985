//! Error taxonomy for bundle loading and transaction evaluation.
//!
//! Only conditions that make a verdict meaningless are errors. Recoverable
//! input problems (missing fields, unseen categories) are reported as
//! [`Anomaly`](crate::types::verdict::Anomaly) values next to the verdict.

use std::fmt;
use std::path::PathBuf;

/// Failure to obtain a usable [`ModelBundle`](crate::models::ModelBundle).
#[derive(Debug, thiserror::Error)]
pub enum ArtifactLoadError {
    /// The artifact could not be fetched from its source.
    #[error("artifact source {source_id} is unreachable: {reason}")]
    Unreachable { source_id: String, reason: String },

    /// The artifact bytes are not a valid manifest.
    #[error("artifact from {source_id} is malformed: {error}")]
    Malformed {
        source_id: String,
        #[source]
        error: serde_json::Error,
    },

    /// A required component is absent from the manifest.
    #[error("artifact from {source_id} is incomplete: missing {component}")]
    Incomplete {
        source_id: String,
        component: &'static str,
    },

    /// The manifest is complete but internally inconsistent.
    #[error("artifact from {source_id} is invalid: {reason}")]
    Invalid { source_id: String, reason: String },

    /// ONNX Runtime refused the referenced model file.
    #[error("failed to load ONNX model {}: {reason}", path.display())]
    Onnx { path: PathBuf, reason: String },
}

/// Pipeline stage at which a row width check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStage {
    Encoding,
    Scaler,
    Classifier,
}

impl fmt::Display for SchemaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaStage::Encoding => "encoding",
            SchemaStage::Scaler => "scaler",
            SchemaStage::Classifier => "classifier",
        };
        f.write_str(name)
    }
}

/// Fatal failure of a single evaluation. The shared bundle is never affected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// A field value cannot be coerced to the kind its column requires.
    #[error("column '{column}': cannot interpret {value} as {expected}")]
    FeatureType {
        column: String,
        value: String,
        expected: &'static str,
    },

    /// A coerced value lies outside the bounds the bundle declares for it.
    #[error("column '{column}': value {value} is outside {bounds}")]
    FeatureRange {
        column: String,
        value: f64,
        bounds: String,
    },

    /// Row width disagrees with what the scaler or classifier was fitted on.
    #[error("schema mismatch at {stage}: expected {expected} features, got {actual}")]
    SchemaMismatch {
        stage: SchemaStage,
        expected: usize,
        actual: usize,
    },

    /// The classifier backend failed or produced an unusable output.
    #[error("classifier inference failed: {0}")]
    Inference(String),
}

impl EvaluationError {
    /// Short stable label, used for metrics and rejection reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationError::FeatureType { .. } => "feature_type",
            EvaluationError::FeatureRange { .. } => "feature_range",
            EvaluationError::SchemaMismatch { .. } => "schema_mismatch",
            EvaluationError::Inference(_) => "inference",
        }
    }

    /// Column the error refers to, when there is one.
    pub fn column(&self) -> Option<&str> {
        match self {
            EvaluationError::FeatureType { column, .. }
            | EvaluationError::FeatureRange { column, .. } => Some(column),
            _ => None,
        }
    }
}
