//! ONNX Runtime classifier backend

use crate::error::{ArtifactLoadError, EvaluationError, SchemaStage};
use crate::models::classifier::{Classifier, Prediction};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{
    DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor, ValueType,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Session plus the resolved input/output names
struct OnnxSession {
    session: Session,
    input_name: String,
    label_output: String,
    probability_output: Option<String>,
}

/// Classifier exported to ONNX (e.g. via skl2onnx).
///
/// ONNX Runtime needs exclusive access per run, so the session sits behind a
/// mutex. Evaluations sharing the bundle serialize only on this call.
pub struct OnnxClassifier {
    path: PathBuf,
    input_width: Option<usize>,
    has_probability: bool,
    session: Mutex<OnnxSession>,
}

fn onnx_error<E: fmt::Display>(path: &Path, err: E) -> ArtifactLoadError {
    ArtifactLoadError::Onnx {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn inference_error<E: fmt::Display>(err: E) -> EvaluationError {
    EvaluationError::Inference(err.to_string())
}

impl OnnxClassifier {
    /// Load a model file.
    ///
    /// The input width is the manifest's `input_width` when declared, otherwise
    /// the model's fixed input shape. A disagreement between the two is refused.
    pub fn load(
        path: &Path,
        threads: usize,
        input_width: Option<usize>,
    ) -> Result<Self, ArtifactLoadError> {
        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let builder = Session::builder().map_err(|e| onnx_error(path, e))?;
        let builder = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| onnx_error(path, e))?;
        let builder = builder
            .with_intra_threads(threads)
            .map_err(|e| onnx_error(path, e))?;
        let session = builder
            .commit_from_file(path)
            .map_err(|e| onnx_error(path, e))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| onnx_error(path, "model declares no inputs"))?;
        let input_name = input.name.clone();

        let model_width = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                fixed_width(&shape.iter().copied().collect::<Vec<i64>>())
            }
            _ => None,
        };
        let input_width = match (input_width, model_width) {
            (Some(declared), Some(actual)) if declared != actual => {
                return Err(onnx_error(
                    path,
                    format!("manifest declares {declared} inputs but the model takes {actual}"),
                ))
            }
            (declared, actual) => declared.or(actual),
        };

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone())
            .ok_or_else(|| onnx_error(path, "model declares no label output"))?;

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        info!(
            path = %path.display(),
            input = %input_name,
            input_width = ?input_width,
            label = %label_output,
            probability = ?probability_output,
            "ONNX model loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            input_width,
            has_probability: probability_output.is_some(),
            session: Mutex::new(OnnxSession {
                session,
                input_name,
                label_output,
                probability_output,
            }),
        })
    }
}

impl fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("path", &self.path)
            .field("input_width", &self.input_width)
            .finish_non_exhaustive()
    }
}

impl Classifier for OnnxClassifier {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn supports_probability(&self) -> bool {
        self.has_probability
    }

    fn predict(&self, scaled: &[f64], positive_class: i64) -> Result<Prediction, EvaluationError> {
        if let Some(expected) = self.input_width {
            if expected != scaled.len() {
                return Err(EvaluationError::SchemaMismatch {
                    stage: SchemaStage::Classifier,
                    expected,
                    actual: scaled.len(),
                });
            }
        }

        // Input tensor shape [1, num_features]
        let features: Vec<f32> = scaled.iter().map(|&x| x as f32).collect();
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features)).map_err(inference_error)?;

        let mut guard = self
            .session
            .lock()
            .map_err(|_| EvaluationError::Inference("ONNX session lock poisoned".to_string()))?;
        let model: &mut OnnxSession = &mut guard;

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input])
            .map_err(inference_error)?;

        let label = extract_label(&outputs, &model.label_output)?;
        let probability = match model.probability_output.as_deref() {
            Some(name) => Some(extract_probability(&outputs, name, positive_class)?),
            None => None,
        };

        debug!(label = label, probability = ?probability, "ONNX inference complete");

        Ok(Prediction { label, probability })
    }
}

/// Feature count of a `[batch, features]` input, unless the last axis is dynamic
fn fixed_width(dims: &[i64]) -> Option<usize> {
    match dims {
        [.., last] if *last > 0 => usize::try_from(*last).ok(),
        _ => None,
    }
}

/// Predicted label from an int64 tensor output
fn extract_label(outputs: &SessionOutputs, name: &str) -> Result<i64, EvaluationError> {
    let output = outputs
        .get(name)
        .ok_or_else(|| inference_error(format!("missing output {name}")))?;
    let (_, data) = output.try_extract_tensor::<i64>().map_err(inference_error)?;
    data.first()
        .copied()
        .ok_or_else(|| inference_error(format!("output {name} is empty")))
}

/// Positive-class probability from either a `[batch, classes]` tensor
/// (XGBoost, random forest) or a `seq(map(int64, float))` (LightGBM, CatBoost).
fn extract_probability(
    outputs: &SessionOutputs,
    name: &str,
    positive_class: i64,
) -> Result<f64, EvaluationError> {
    let output = outputs
        .get(name)
        .ok_or_else(|| inference_error(format!("missing output {name}")))?;

    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return probability_from_tensor(&dims, data, positive_class)
            .ok_or_else(|| inference_error(format!("no probability for class {positive_class}")));
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return probability_from_sequence_map(output, positive_class);
    }

    Err(inference_error(format!(
        "unsupported probability output type for {name}"
    )))
}

fn probability_from_tensor(dims: &[i64], data: &[f32], positive_class: i64) -> Option<f64> {
    let num_classes = dims.last().copied().unwrap_or(data.len() as i64);

    if num_classes >= 2 {
        let idx = usize::try_from(positive_class).ok()?;
        if (idx as i64) < num_classes {
            return data.get(idx).map(|&p| p as f64);
        }
        None
    } else if num_classes == 1 {
        // single column holds the probability of class 1
        data.first().map(|&p| {
            if positive_class == 1 {
                p as f64
            } else {
                1.0 - p as f64
            }
        })
    } else {
        None
    }
}

fn probability_from_sequence_map(
    output: &DynValue,
    positive_class: i64,
) -> Result<f64, EvaluationError> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(inference_error)?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(inference_error)?;

    // batch size is always 1
    let first = maps
        .first()
        .ok_or_else(|| inference_error("empty probability sequence"))?;
    let pairs = first
        .try_extract_key_values::<i64, f32>()
        .map_err(inference_error)?;

    pairs
        .iter()
        .find(|(class_id, _)| *class_id == positive_class)
        .map(|(_, prob)| *prob as f64)
        .ok_or_else(|| inference_error(format!("no probability for class {positive_class}")))
}
