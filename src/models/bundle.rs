//! Immutable model bundle: classifier, scaler, encoders and feature schema

use crate::error::ArtifactLoadError;
use crate::models::classifier::{Classifier, LinearClassifier, LinearLink};
use crate::models::encoder::{Encoder, EncoderRegistry, EncoderSpec, FallbackPolicy};
use crate::models::onnx::OnnxClassifier;
use crate::models::scaler::{ScalerSpec, StandardScaler};
use crate::models::source::ArtifactSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

fn default_positive_class() -> i64 {
    1
}

fn default_classes() -> [i64; 2] {
    [0, 1]
}

/// Artifact manifest as produced by the training side.
///
/// Every required component is optional here so that an incomplete artifact
/// is reported as [`ArtifactLoadError::Incomplete`] rather than a parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub trained_at: Option<String>,
    pub selected_features: Option<Vec<String>>,
    #[serde(default)]
    pub feature_sources: BTreeMap<String, FeatureSource>,
    pub encoders: Option<BTreeMap<String, EncoderSpec>>,
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,
    pub scaler: Option<ScalerSpec>,
    pub classifier: Option<ClassifierSpec>,
    #[serde(default = "default_positive_class")]
    pub positive_class: i64,
}

/// Classifier section of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    Logistic {
        coefficients: Vec<f64>,
        intercept: f64,
        #[serde(default = "default_classes")]
        classes: [i64; 2],
    },
    LinearSvm {
        coefficients: Vec<f64>,
        intercept: f64,
        #[serde(default = "default_classes")]
        classes: [i64; 2],
    },
    Onnx {
        /// Model file, relative to the manifest
        path: PathBuf,
        #[serde(default)]
        input_width: Option<usize>,
    },
}

/// Transformation from a raw field value to a numeric feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureTransform {
    #[default]
    Identity,
    /// Date/time to seconds since the Unix epoch
    UnixSeconds,
    /// Date to whole days since 1970-01-01
    DaysSinceEpoch,
}

/// Inclusive numeric bounds for a feature value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "[{min}, {max}]"),
            (Some(min), None) => write!(f, "[{min}, +inf)"),
            (None, Some(max)) => write!(f, "(-inf, {max}]"),
            (None, None) => f.write_str("(-inf, +inf)"),
        }
    }
}

/// Declares how a trained feature is fed from the raw input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSource {
    /// Raw field name, when it differs from the feature name
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub transform: FeatureTransform,
    /// Value used when the field is absent (numeric features only, default 0)
    #[serde(default)]
    pub default: Option<f64>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Declared kind; when absent the kind follows from whether an encoder exists
    #[serde(default)]
    pub kind: Option<FeatureKind>,
}

impl FeatureSource {
    /// Raw field feeding the feature `column`
    pub fn field_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.field.as_deref().unwrap_or(column)
    }
}

/// Whether a feature is fed as a number or through an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// One trained feature with its resolved kind and source
#[derive(Debug, Clone)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
    pub source: FeatureSource,
}

/// Options that affect how a bundle is materialized, not what it contains
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Intra-op threads per ONNX session
    pub onnx_threads: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

/// Provenance of a loaded bundle
#[derive(Debug, Clone, Serialize)]
pub struct BundleMetadata {
    pub source_id: String,
    pub version: Option<String>,
    pub trained_at: Option<String>,
}

/// Human-readable description of a bundle, for logs and operator tooling
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub version: Option<String>,
    pub features: Vec<String>,
    /// Encoded column name and number of known labels
    pub encoded_columns: Vec<(String, usize)>,
    pub classifier: &'static str,
    pub supports_probability: bool,
    pub positive_class: i64,
}

/// Fitted classifier, scaler, encoders and ordered feature schema.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct ModelBundle {
    selected_features: Vec<String>,
    columns: Vec<FeatureColumn>,
    encoders: EncoderRegistry,
    scaler: StandardScaler,
    classifier: Box<dyn Classifier>,
    positive_class: i64,
    metadata: BundleMetadata,
}

impl ModelBundle {
    /// Load a bundle with default options
    pub fn load(source: &dyn ArtifactSource) -> Result<Self, ArtifactLoadError> {
        Self::load_with(source, &LoadOptions::default())
    }

    /// Fetch, parse and validate a bundle
    pub fn load_with(
        source: &dyn ArtifactSource,
        options: &LoadOptions,
    ) -> Result<Self, ArtifactLoadError> {
        let source_id = source.identity();
        let bytes = source.fetch()?;

        let manifest: BundleManifest =
            serde_json::from_slice(&bytes).map_err(|error| ArtifactLoadError::Malformed {
                source_id: source_id.clone(),
                error,
            })?;

        Self::from_manifest(manifest, source, options)
    }

    /// Validate a parsed manifest and materialize its components
    pub fn from_manifest(
        manifest: BundleManifest,
        source: &dyn ArtifactSource,
        options: &LoadOptions,
    ) -> Result<Self, ArtifactLoadError> {
        let source_id = source.identity();
        let incomplete = |component| ArtifactLoadError::Incomplete {
            source_id: source_id.clone(),
            component,
        };
        let invalid = |reason: String| ArtifactLoadError::Invalid {
            source_id: source_id.clone(),
            reason,
        };

        let selected_features = manifest
            .selected_features
            .ok_or_else(|| incomplete("selected_features"))?;
        let encoder_specs = manifest.encoders.ok_or_else(|| incomplete("encoders"))?;
        let scaler_spec = manifest.scaler.ok_or_else(|| incomplete("scaler"))?;
        let classifier_spec = manifest.classifier.ok_or_else(|| incomplete("classifier"))?;

        if selected_features.is_empty() {
            return Err(invalid("selected_features is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &selected_features {
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("feature {name:?} is listed twice")));
            }
        }

        let mut encoders = EncoderRegistry::new();
        for (column, spec) in encoder_specs {
            if !seen.contains(column.as_str()) {
                warn!(
                    source = %source_id,
                    column = %column,
                    "Encoder for a column the classifier does not use, ignoring"
                );
                continue;
            }
            let encoder = Encoder::from_spec(spec, manifest.fallback_policy)
                .map_err(|e| invalid(format!("encoder for {column:?}: {e}")))?;
            encoders.insert(column, encoder);
        }

        for column in manifest.feature_sources.keys() {
            if !seen.contains(column.as_str()) {
                warn!(
                    source = %source_id,
                    column = %column,
                    "Feature source for an unknown feature, ignoring"
                );
            }
        }

        let mut feature_sources = manifest.feature_sources;
        let mut columns = Vec::with_capacity(selected_features.len());
        for name in &selected_features {
            let source_decl = feature_sources.remove(name).unwrap_or_default();
            let has_encoder = encoders.contains(name);
            let kind = match (source_decl.kind, has_encoder) {
                (Some(FeatureKind::Categorical), false) => {
                    return Err(invalid(format!(
                        "categorical feature {name:?} has no encoder"
                    )))
                }
                (Some(FeatureKind::Numeric), true) => {
                    return Err(invalid(format!(
                        "numeric feature {name:?} also has an encoder"
                    )))
                }
                (_, true) => FeatureKind::Categorical,
                (_, false) => FeatureKind::Numeric,
            };

            if kind == FeatureKind::Categorical
                && (source_decl.transform != FeatureTransform::Identity
                    || source_decl.bounds.is_some()
                    || source_decl.default.is_some())
            {
                return Err(invalid(format!(
                    "categorical feature {name:?} cannot declare a transform, bounds or default"
                )));
            }
            if let Some(default) = source_decl.default {
                if !default.is_finite() {
                    return Err(invalid(format!("default for {name:?} is not finite")));
                }
            }

            columns.push(FeatureColumn {
                name: name.clone(),
                kind,
                source: source_decl,
            });
        }

        let scaler = StandardScaler::from_spec(scaler_spec).map_err(invalid)?;
        let classifier = build_classifier(
            classifier_spec,
            manifest.positive_class,
            source,
            options,
            &source_id,
        )?;

        let bundle = Self {
            selected_features,
            columns,
            encoders,
            scaler,
            classifier,
            positive_class: manifest.positive_class,
            metadata: BundleMetadata {
                source_id: source_id.clone(),
                version: manifest.version,
                trained_at: manifest.trained_at,
            },
        };

        let summary = bundle.describe();
        info!(
            source = %source_id,
            version = ?summary.version,
            features = summary.features.len(),
            encoded_columns = ?summary.encoded_columns,
            classifier = summary.classifier,
            probability = summary.supports_probability,
            "Model bundle loaded"
        );

        Ok(bundle)
    }

    /// Feature names in the order the classifier was trained on
    pub fn selected_features(&self) -> &[String] {
        &self.selected_features
    }

    /// Features with resolved kind and raw-field mapping, same order
    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn feature_kind(&self, column: &str) -> Option<FeatureKind> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.kind)
    }

    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    /// Labels a categorical column accepts without fallback
    pub fn known_labels(&self, column: &str) -> Option<&[String]> {
        self.encoders.get(column).map(Encoder::known_labels)
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Class label that means fraud
    pub fn positive_class(&self) -> i64 {
        self.positive_class
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn describe(&self) -> BundleSummary {
        BundleSummary {
            version: self.metadata.version.clone(),
            features: self.selected_features.clone(),
            encoded_columns: self
                .encoders
                .iter()
                .map(|(column, encoder)| (column.to_string(), encoder.len()))
                .collect(),
            classifier: self.classifier.kind(),
            supports_probability: self.classifier.supports_probability(),
            positive_class: self.positive_class,
        }
    }
}

fn build_classifier(
    spec: ClassifierSpec,
    positive_class: i64,
    source: &dyn ArtifactSource,
    options: &LoadOptions,
    source_id: &str,
) -> Result<Box<dyn Classifier>, ArtifactLoadError> {
    let invalid = |reason: String| ArtifactLoadError::Invalid {
        source_id: source_id.to_string(),
        reason,
    };
    let check_positive = |classes: [i64; 2]| {
        if classes.contains(&positive_class) {
            Ok(())
        } else {
            Err(invalid(format!(
                "positive class {positive_class} is not one of the classifier classes {classes:?}"
            )))
        }
    };

    match spec {
        ClassifierSpec::Logistic {
            coefficients,
            intercept,
            classes,
        } => {
            check_positive(classes)?;
            Ok(Box::new(
                LinearClassifier::new(coefficients, intercept, classes, LinearLink::Logistic)
                    .map_err(invalid)?,
            ))
        }
        ClassifierSpec::LinearSvm {
            coefficients,
            intercept,
            classes,
        } => {
            check_positive(classes)?;
            Ok(Box::new(
                LinearClassifier::new(coefficients, intercept, classes, LinearLink::Margin)
                    .map_err(invalid)?,
            ))
        }
        ClassifierSpec::Onnx { path, input_width } => {
            let resolved = source
                .resolve(&path)
                .ok_or_else(|| ArtifactLoadError::Unreachable {
                    source_id: source_id.to_string(),
                    reason: format!("cannot resolve model file {}", path.display()),
                })?;
            Ok(Box::new(OnnxClassifier::load(
                &resolved,
                options.onnx_threads,
                input_width,
            )?))
        }
    }
}
