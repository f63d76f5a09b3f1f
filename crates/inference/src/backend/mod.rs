use crate::config::DetectorConfig;
use ndarray::{Array, ArrayD, IxDyn};
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// A loaded detection model. Implementations need exclusive access while
/// running, so callers sharing one backend must serialize `infer`.
pub trait InferenceBackend: Send {
    fn load_model(path: &Path, config: &DetectorConfig) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a preprocessed `[1, 3, H, W]` tensor.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

pub struct InferenceOutput {
    pub dets: ArrayD<f32>,   // [1, Q, 4] cxcywh (normalized 0-1)
    pub logits: ArrayD<f32>, // [1, Q, num_classes] class logits, index 0 = background
}
