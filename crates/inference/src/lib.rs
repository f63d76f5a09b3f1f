pub mod annotate;
pub mod backend;
pub mod config;
pub mod detection;
pub mod detector;
pub mod errors;
pub mod labels;
pub mod processing;

// Re-export commonly used types for convenience
pub use annotate::Annotator;
pub use backend::{InferenceBackend, InferenceOutput};
pub use config::{DetectorConfig, ExecutionProvider};
pub use detection::{Detection, DetectionResult};
pub use detector::{Detector, ModelDetector, load_image};
pub use errors::DetectorError;
pub use labels::Labels;

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
