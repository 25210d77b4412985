//! Feature rows passed between pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// One reconciled, correctly-typed feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Numeric(n) => write!(f, "{n}"),
            FeatureValue::Categorical(s) => write!(f, "{s:?}"),
        }
    }
}

/// Row of raw feature values in `selected_features` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledFeatureRow(Vec<FeatureValue>);

impl ReconciledFeatureRow {
    pub fn new(values: Vec<FeatureValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fully numeric row after categorical encoding; the scaler's only input.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow(Vec<f64>);

impl EncodedRow {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
