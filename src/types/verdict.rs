//! Verdict, anomaly and report data structures

use crate::error::EvaluationError;
use crate::types::feature::FeatureValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision for a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// True iff the classifier predicted the positive (fraud) class
    pub is_fraud: bool,

    /// Positive-class probability, when the classifier exposes one
    pub probability: Option<f64>,
}

/// Non-fatal deviation from the expected input, resolved deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// The field feeding `column` was absent; `substituted` was used instead
    MissingFeature {
        column: String,
        substituted: FeatureValue,
    },

    /// The label was never seen in training and was replaced by the fallback
    UnknownCategory {
        column: String,
        original: String,
        substituted: String,
    },
}

impl Anomaly {
    pub fn column(&self) -> &str {
        match self {
            Anomaly::MissingFeature { column, .. } | Anomaly::UnknownCategory { column, .. } => {
                column
            }
        }
    }

    /// Short stable label, used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::MissingFeature { .. } => "missing_feature",
            Anomaly::UnknownCategory { .. } => "unknown_category",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingFeature {
                column,
                substituted,
            } => write!(f, "column '{column}' missing, defaulted to {substituted}"),
            Anomaly::UnknownCategory {
                column,
                original,
                substituted,
            } => write!(
                f,
                "column '{column}': unknown label {original:?} replaced by {substituted:?}"
            ),
        }
    }
}

/// Successful pipeline outcome: the verdict plus every anomaly met on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub anomalies: Vec<Anomaly>,
}

impl Evaluation {
    /// True when any fallback was applied, so the verdict deserves less trust
    pub fn is_degraded(&self) -> bool {
        !self.anomalies.is_empty()
    }

    pub fn unknown_categories(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::UnknownCategory { .. }))
    }
}

/// Message published for every scored transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictReport {
    /// Unique report identifier
    pub report_id: String,

    /// Caller's transaction ID, when the input carried one
    pub transaction_id: Option<String>,

    pub verdict: Verdict,

    pub anomalies: Vec<Anomaly>,

    /// Version of the bundle that produced the verdict
    pub bundle_version: Option<String>,

    /// Report generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl VerdictReport {
    pub fn new(transaction_id: Option<String>, evaluation: Evaluation) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            verdict: evaluation.verdict,
            anomalies: evaluation.anomalies,
            bundle_version: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_bundle_version(mut self, version: Option<String>) -> Self {
        self.bundle_version = version;
        self
    }
}

/// `error_kind` of a rejection whose payload could not be decoded
pub const UNDECODABLE_KIND: &str = "undecodable";

/// Message published when a transaction could not be scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionReport {
    pub report_id: String,
    pub transaction_id: Option<String>,
    /// Stable error label, see [`EvaluationError::kind`]
    pub error_kind: String,
    /// Offending column, when the error names one
    pub column: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RejectionReport {
    pub fn new(transaction_id: Option<String>, error: &EvaluationError) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            error_kind: error.kind().to_string(),
            column: error.column().map(str::to_string),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Rejection for a payload that is not a JSON object of field values
    pub fn undecodable(error: &serde_json::Error) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: None,
            error_kind: UNDECODABLE_KIND.to_string(),
            column: None,
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_serialization_is_tagged() {
        let anomaly = Anomaly::UnknownCategory {
            column: "category".to_string(),
            original: "crypto_atm".to_string(),
            substituted: "entertainment".to_string(),
        };

        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["kind"], "unknown_category");
        assert_eq!(json["column"], "category");

        let back: Anomaly = serde_json::from_value(json).unwrap();
        assert_eq!(back, anomaly);
    }

    #[test]
    fn test_evaluation_degraded() {
        let clean = Evaluation {
            verdict: Verdict {
                is_fraud: false,
                probability: Some(0.1),
            },
            anomalies: Vec::new(),
        };
        assert!(!clean.is_degraded());

        let degraded = Evaluation {
            anomalies: vec![Anomaly::MissingFeature {
                column: "amt".to_string(),
                substituted: FeatureValue::Numeric(0.0),
            }],
            ..clean
        };
        assert!(degraded.is_degraded());
        assert_eq!(degraded.unknown_categories().count(), 0);
    }

    #[test]
    fn test_rejection_report_from_error() {
        let err = EvaluationError::FeatureType {
            column: "amt".to_string(),
            value: "\"abc\"".to_string(),
            expected: "a number",
        };
        let report = RejectionReport::new(Some("tx_9".to_string()), &err);

        assert_eq!(report.error_kind, "feature_type");
        assert_eq!(report.column.as_deref(), Some("amt"));
        assert!(report.message.contains("abc"));
    }

    #[test]
    fn test_rejection_report_for_undecodable_payload() {
        let err = serde_json::from_str::<serde_json::Value>("[1,").unwrap_err();
        let report = RejectionReport::undecodable(&err);

        assert_eq!(report.error_kind, UNDECODABLE_KIND);
        assert_eq!(report.transaction_id, None);
        assert_eq!(report.column, None);
    }
}
