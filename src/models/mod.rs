//! Model bundle components: artifact loading, encoders, scaler and classifiers

pub mod bundle;
pub mod classifier;
pub mod encoder;
pub mod onnx;
pub mod scaler;
pub mod source;
pub mod store;

pub use bundle::{FeatureKind, LoadOptions, ModelBundle};
pub use classifier::{Classifier, Prediction};
pub use encoder::{Encoder, EncoderRegistry, FallbackPolicy};
pub use scaler::StandardScaler;
pub use source::{ArtifactSource, FileSource, InMemorySource};
pub use store::BundleStore;
