//! ML model components

pub mod artifact;
pub mod holder;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tree;

pub use artifact::{ArtifactDocument, ArtifactMetadata, ModelArtifact, ModelSpec};
pub use holder::ModelHolder;
pub use inference::FraudModel;
pub use loader::ModelLoader;
pub use tree::TreeEnsemble;
