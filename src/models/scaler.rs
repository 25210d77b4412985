//! Per-column standard scaler

use crate::error::{EvaluationError, SchemaStage};
use serde::{Deserialize, Serialize};

/// Scaler statistics as stored in the artifact manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerSpec {
    #[serde(alias = "mean_")]
    pub mean: Vec<f64>,
    #[serde(alias = "scale_")]
    pub scale: Vec<f64>,
}

/// Fitted affine normalization: `(x - mean) / scale` per column.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Validate fitted statistics. Width is checked against rows at transform time.
    pub fn from_spec(spec: ScalerSpec) -> Result<Self, String> {
        if spec.mean.len() != spec.scale.len() {
            return Err(format!(
                "scaler has {} means but {} scales",
                spec.mean.len(),
                spec.scale.len()
            ));
        }
        if let Some(idx) = spec.mean.iter().position(|m| !m.is_finite()) {
            return Err(format!("scaler mean at column {idx} is not finite"));
        }
        if let Some(idx) = spec
            .scale
            .iter()
            .position(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(format!("scaler scale at column {idx} must be finite and non-zero"));
        }

        Ok(Self {
            mean: spec.mean,
            scale: spec.scale,
        })
    }

    /// Number of columns the scaler was fitted on
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Scale a full row. A row of the wrong width is a schema mismatch.
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, EvaluationError> {
        if row.len() != self.width() {
            return Err(EvaluationError::SchemaMismatch {
                stage: SchemaStage::Scaler,
                expected: self.width(),
                actual: row.len(),
            });
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect())
    }
}
