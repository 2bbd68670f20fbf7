pub mod features;
pub mod loader;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx_model;
pub mod session;

pub use features::{BuiltFeatures, FeatureBuilder, FeatureRow, FeatureVector};
pub use loader::{ArtifactFormat, ModelArtifactLoader};
pub use model::{Classifier, LogisticModel, ModelWeights, Score};
#[cfg(feature = "onnx")]
pub use onnx_model::OnnxModel;
pub use session::ModelSession;
