//! Pipeline orchestration: reconcile, encode, score.

use crate::encoding::encode_row;
use crate::error::EvaluationError;
use crate::models::bundle::ModelBundle;
use crate::models::store::BundleStore;
use crate::reconciler::reconcile;
use crate::scorer::score;
use crate::types::transaction::RawTransactionInput;
use crate::types::verdict::Evaluation;
use std::sync::Arc;
use tracing::debug;

/// Evaluate one transaction against `bundle`.
///
/// Stops at the first fatal error. On success every anomaly from
/// reconciliation and encoding is returned with the verdict, in that order.
pub fn evaluate(
    raw: &RawTransactionInput,
    bundle: &ModelBundle,
) -> Result<Evaluation, EvaluationError> {
    let reconciliation = reconcile(raw, bundle)?;
    let mut anomalies = reconciliation.anomalies;

    let (encoded, encoding_anomalies) = encode_row(&reconciliation.row, bundle)?;
    anomalies.extend(encoding_anomalies);

    let verdict = score(&encoded, bundle)?;

    debug!(
        is_fraud = verdict.is_fraud,
        probability = ?verdict.probability,
        anomalies = anomalies.len(),
        "Transaction evaluated"
    );

    Ok(Evaluation { verdict, anomalies })
}

/// Entry point for callers holding the process-wide [`BundleStore`].
///
/// Each call snapshots the current bundle once, so a concurrent refresh never
/// mixes two bundles inside one evaluation.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Arc<BundleStore>,
}

impl Pipeline {
    pub fn new(store: Arc<BundleStore>) -> Self {
        Self { store }
    }

    /// Evaluate against the current bundle, returning the snapshot that was used
    pub fn evaluate(
        &self,
        raw: &RawTransactionInput,
    ) -> (Arc<ModelBundle>, Result<Evaluation, EvaluationError>) {
        let bundle = self.store.current();
        let outcome = evaluate(raw, &bundle);
        (bundle, outcome)
    }

    /// Bundle the next evaluation will use
    pub fn bundle(&self) -> Arc<ModelBundle> {
        self.store.current()
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }
}
