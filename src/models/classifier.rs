//! Binary classifier contract and the linear backends

use crate::error::{EvaluationError, SchemaStage};
use std::fmt;

/// Output of a single classifier invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label
    pub label: i64,
    /// Probability of the requested positive class, when supported
    pub probability: Option<f64>,
}

/// Pre-fitted binary classifier.
///
/// Label and probability come from one call on the same scaled row.
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Backend name, e.g. "logistic" or "onnx"
    fn kind(&self) -> &'static str;

    /// Number of input features, when the backend knows it
    fn input_width(&self) -> Option<usize>;

    /// Whether `predict` fills in `probability`
    fn supports_probability(&self) -> bool;

    /// Predict the label for a scaled row and the probability of `positive_class`
    fn predict(&self, scaled: &[f64], positive_class: i64) -> Result<Prediction, EvaluationError>;
}

/// Output link of a linear model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearLink {
    /// Logistic regression: decision passed through the sigmoid
    Logistic,
    /// Linear SVM: decision function only, no probability
    Margin,
}

/// Linear decision function `intercept + w·x` over two classes.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    coefficients: Vec<f64>,
    intercept: f64,
    /// `[negative, positive]` side of the decision boundary
    classes: [i64; 2],
    link: LinearLink,
}

impl LinearClassifier {
    pub fn new(
        coefficients: Vec<f64>,
        intercept: f64,
        classes: [i64; 2],
        link: LinearLink,
    ) -> Result<Self, String> {
        if coefficients.is_empty() {
            return Err("linear classifier has no coefficients".to_string());
        }
        if coefficients.iter().any(|c| !c.is_finite()) || !intercept.is_finite() {
            return Err("linear classifier parameters must be finite".to_string());
        }
        if classes[0] == classes[1] {
            return Err(format!("classifier classes must differ, got {classes:?}"));
        }
        Ok(Self {
            coefficients,
            intercept,
            classes,
            link,
        })
    }

    fn decision(&self, scaled: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(scaled)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LinearClassifier {
    fn kind(&self) -> &'static str {
        match self.link {
            LinearLink::Logistic => "logistic",
            LinearLink::Margin => "linear_svm",
        }
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }

    fn supports_probability(&self) -> bool {
        self.link == LinearLink::Logistic
    }

    fn predict(&self, scaled: &[f64], positive_class: i64) -> Result<Prediction, EvaluationError> {
        if scaled.len() != self.coefficients.len() {
            return Err(EvaluationError::SchemaMismatch {
                stage: SchemaStage::Classifier,
                expected: self.coefficients.len(),
                actual: scaled.len(),
            });
        }

        let decision = self.decision(scaled);
        if !decision.is_finite() {
            return Err(EvaluationError::Inference(format!(
                "decision function is not finite ({decision})"
            )));
        }

        let label = if decision > 0.0 {
            self.classes[1]
        } else {
            self.classes[0]
        };

        let probability = match self.link {
            LinearLink::Margin => None,
            LinearLink::Logistic => {
                let upper = sigmoid(decision);
                if positive_class == self.classes[1] {
                    Some(upper)
                } else if positive_class == self.classes[0] {
                    Some(1.0 - upper)
                } else {
                    return Err(EvaluationError::Inference(format!(
                        "positive class {positive_class} is not one of {:?}",
                        self.classes
                    )));
                }
            }
        };

        Ok(Prediction { label, probability })
    }
}
