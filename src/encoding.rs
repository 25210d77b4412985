//! Categorical encoding with a deterministic fallback for unseen labels

use crate::error::{EvaluationError, SchemaStage};
use crate::models::bundle::{FeatureKind, ModelBundle};
use crate::models::encoder::Encoder;
use crate::types::feature::{EncodedRow, FeatureValue, ReconciledFeatureRow};
use crate::types::verdict::Anomaly;
use tracing::warn;

/// Encode one label.
///
/// Labels outside the encoder's known set are replaced by its fallback label
/// before lookup, so this never fails. The substitution is returned as an
/// [`Anomaly::UnknownCategory`].
pub fn encode(column: &str, value: &str, encoder: &Encoder) -> (i64, Option<Anomaly>) {
    if let Some(code) = encoder.code_of(value) {
        return (code, None);
    }

    let substituted = encoder.fallback_label();
    warn!(
        column = %column,
        original = %value,
        substituted = %substituted,
        "Unknown category, using fallback label"
    );

    (
        encoder.fallback_code(),
        Some(Anomaly::UnknownCategory {
            column: column.to_string(),
            original: value.to_string(),
            substituted: substituted.to_string(),
        }),
    )
}

/// Encode every categorical column of a reconciled row, column by column.
pub fn encode_row(
    row: &ReconciledFeatureRow,
    bundle: &ModelBundle,
) -> Result<(EncodedRow, Vec<Anomaly>), EvaluationError> {
    let columns = bundle.columns();
    if row.len() != columns.len() {
        return Err(EvaluationError::SchemaMismatch {
            stage: SchemaStage::Encoding,
            expected: columns.len(),
            actual: row.len(),
        });
    }

    let mut encoded = Vec::with_capacity(row.len());
    let mut anomalies = Vec::new();

    for (column, value) in columns.iter().zip(row.values()) {
        match (column.kind, value) {
            (FeatureKind::Numeric, FeatureValue::Numeric(n)) => encoded.push(*n),
            (FeatureKind::Categorical, FeatureValue::Categorical(label)) => {
                let encoder = bundle.encoders().get(&column.name).ok_or_else(|| {
                    EvaluationError::Inference(format!("no encoder for column {:?}", column.name))
                })?;
                let (code, anomaly) = encode(&column.name, label, encoder);
                anomalies.extend(anomaly);
                encoded.push(code as f64);
            }
            (FeatureKind::Numeric, other) => {
                return Err(EvaluationError::FeatureType {
                    column: column.name.clone(),
                    value: other.to_string(),
                    expected: "a number",
                })
            }
            (FeatureKind::Categorical, other) => {
                return Err(EvaluationError::FeatureType {
                    column: column.name.clone(),
                    value: other.to_string(),
                    expected: "a label",
                })
            }
        }
    }

    Ok((EncodedRow::new(encoded), anomalies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::InMemorySource;
    use serde_json::json;

    fn categories() -> Encoder {
        Encoder::new(["entertainment", "food_dining", "grocery_pos"]).unwrap()
    }

    #[test]
    fn test_known_label_is_deterministic() {
        let encoder = categories();
        let first = encode("category", "grocery_pos", &encoder);
        let second = encode("category", "grocery_pos", &encoder);

        assert_eq!(first, (2, None));
        assert_eq!(first, second);
        assert_eq!(encoder.decode(first.0), Some("grocery_pos"));
    }

    #[test]
    fn test_unknown_label_falls_back_with_one_warning() {
        let encoder = categories();
        let (code, anomaly) = encode("category", "crypto_atm", &encoder);

        assert_eq!(code, encoder.fallback_code());
        assert_eq!(
            anomaly,
            Some(Anomaly::UnknownCategory {
                column: "category".to_string(),
                original: "crypto_atm".to_string(),
                substituted: "entertainment".to_string(),
            })
        );
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let (_, anomaly) = encode("category", "Grocery_POS", &categories());
        assert!(anomaly.is_some());
    }

    fn bundle() -> ModelBundle {
        let manifest = json!({
            "selected_features": ["amt", "category"],
            "encoders": {"category": {"classes": ["entertainment", "food_dining", "grocery_pos"]}},
            "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "classifier": {"kind": "logistic", "coefficients": [0.0, 0.0], "intercept": 0.0}
        });
        ModelBundle::load(&InMemorySource::from_json("mem://encoding", &manifest)).unwrap()
    }

    #[test]
    fn test_encode_row() {
        let bundle = bundle();
        let row = ReconciledFeatureRow::new(vec![
            FeatureValue::Numeric(12.5),
            FeatureValue::Categorical("food_dining".to_string()),
        ]);

        let (encoded, anomalies) = encode_row(&row, &bundle).unwrap();
        assert_eq!(encoded.values(), &[12.5, 1.0]);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_encode_row_rejects_wrong_width() {
        let bundle = bundle();
        let row = ReconciledFeatureRow::new(vec![FeatureValue::Numeric(1.0)]);

        let err = encode_row(&row, &bundle).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::SchemaMismatch {
                stage: SchemaStage::Encoding,
                expected: 2,
                actual: 1,
            }
        ));
    }

    #[test]
    fn test_encode_row_rejects_kind_mismatch() {
        let bundle = bundle();
        let row = ReconciledFeatureRow::new(vec![
            FeatureValue::Categorical("x".to_string()),
            FeatureValue::Categorical("food_dining".to_string()),
        ]);

        let err = encode_row(&row, &bundle).unwrap_err();
        assert_eq!(err.column(), Some("amt"));
    }
}
