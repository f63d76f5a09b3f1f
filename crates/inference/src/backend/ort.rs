use super::{InferenceBackend, InferenceOutput};
use crate::config::{DetectorConfig, ExecutionProvider};
use anyhow::Context;
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

pub struct OrtBackend {
    session: Session,
    input_name: String,
    dets_output: String,
    logits_output: String,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Session> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!(path = %path.display(), "Model loaded");
        Ok(session)
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &Path, config: &DetectorConfig) -> anyhow::Result<Self> {
        let session =
            Self::load_model_with_provider(path, config.execution_provider, config.intra_threads)?;

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            dets_output: config.dets_output.clone(),
            logits_output: config.logits_output.clone(),
        })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(images.view())?
        ])?;

        let dets = outputs
            .get(self.dets_output.as_str())
            .with_context(|| format!("model has no output named `{}`", self.dets_output))?
            .try_extract_array::<f32>()?;
        let logits = outputs
            .get(self.logits_output.as_str())
            .with_context(|| format!("model has no output named `{}`", self.logits_output))?
            .try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            dets: dets.into_owned(),
            logits: logits.into_owned(),
        })
    }
}
