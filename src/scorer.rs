//! Scaling, classification and verdict derivation

use crate::error::{EvaluationError, SchemaStage};
use crate::models::bundle::ModelBundle;
use crate::types::feature::EncodedRow;
use crate::types::verdict::Verdict;
use tracing::debug;

/// Score an encoded row.
///
/// The label and the probability come from the same classifier call on the
/// same scaled row.
pub fn score(row: &EncodedRow, bundle: &ModelBundle) -> Result<Verdict, EvaluationError> {
    let scaled = bundle.scaler().transform(row.values())?;

    let classifier = bundle.classifier();
    if let Some(expected) = classifier.input_width() {
        if expected != scaled.len() {
            return Err(EvaluationError::SchemaMismatch {
                stage: SchemaStage::Classifier,
                expected,
                actual: scaled.len(),
            });
        }
    }

    let positive_class = bundle.positive_class();
    let prediction = classifier.predict(&scaled, positive_class)?;

    if let Some(p) = prediction.probability {
        if !(0.0..=1.0).contains(&p) {
            return Err(EvaluationError::Inference(format!(
                "{} returned probability {p} outside [0, 1]",
                classifier.kind()
            )));
        }
    }

    let verdict = Verdict {
        is_fraud: prediction.label == positive_class,
        probability: prediction.probability,
    };

    debug!(
        classifier = classifier.kind(),
        label = prediction.label,
        is_fraud = verdict.is_fraud,
        probability = ?verdict.probability,
        "Row scored"
    );

    Ok(verdict)
}
