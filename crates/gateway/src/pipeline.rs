use crate::metrics::PipelineMetrics;
use crate::store::{ArtifactId, ArtifactStore, ImageExtension, StorageError, artifact_file_name};
use inference::{Detector, DetectorError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

/// Route under which persisted predictions are served.
pub const PREDICTIONS_URL_PREFIX: &str = "/static/predictions";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No image uploaded")]
    NoImage,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Inference(#[from] DetectorError),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Prediction task failed: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Low-cardinality label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoImage => "no_image",
            Self::Storage(_) => "storage",
            Self::Inference(_) => "inference",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

/// One uploaded file, as received.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionResponse {
    pub prediction_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Stored,
    Inferred,
    Rendered,
    Persisted,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Stored => "stored",
            Stage::Inferred => "inferred",
            Stage::Rendered => "rendered",
            Stage::Persisted => "persisted",
            Stage::Responded => "responded",
        }
    }

    fn enter(self) {
        tracing::debug!(stage = self.as_str(), "Prediction stage reached");
    }
}

/// Upload -> store -> infer -> render -> persist.
pub struct PredictionPipeline {
    store: ArtifactStore,
    detector: Arc<dyn Detector>,
    inference_timeout: Duration,
    metrics: PipelineMetrics,
}

impl PredictionPipeline {
    pub fn new(
        store: ArtifactStore,
        detector: Arc<dyn Detector>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            store,
            detector,
            inference_timeout,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run [`Self::handle_prediction`] on its own task, so the prediction
    /// completes and is persisted even if the caller stops waiting.
    pub async fn handle_detached(
        self: Arc<Self>,
        upload: Option<Upload>,
    ) -> Result<PredictionResponse, PipelineError> {
        tokio::spawn(async move { self.handle_prediction(upload).await })
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?
    }

    /// An absent or empty upload is [`PipelineError::NoImage`].
    pub async fn handle_prediction(
        &self,
        upload: Option<Upload>,
    ) -> Result<PredictionResponse, PipelineError> {
        let started = Instant::now();

        let Some(upload) = upload.filter(|u| !u.bytes.is_empty()) else {
            self.metrics.record_failure(PipelineError::NoImage.reason());
            return Err(PipelineError::NoImage);
        };

        let extension = ImageExtension::from_filename(upload.filename.as_deref());
        let id = self.store.allocate_identifier();
        let span = tracing::info_span!("prediction", %id, %extension);

        let outcome = self
            .process(id, extension, upload.bytes)
            .instrument(span.clone())
            .await;

        match outcome {
            Ok((response, detections)) => {
                self.metrics.record_success(started.elapsed(), detections);
                span.in_scope(|| {
                    Stage::Responded.enter();
                    tracing::info!(
                        detections,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Prediction complete"
                    );
                });
                Ok(response)
            }
            Err(e) => {
                self.metrics.record_failure(e.reason());
                span.in_scope(|| {
                    tracing::warn!(error = %e, reason = e.reason(), "Prediction failed")
                });
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        id: ArtifactId,
        extension: ImageExtension,
        bytes: Vec<u8>,
    ) -> Result<(PredictionResponse, usize), PipelineError> {
        Stage::Received.enter();

        let store = self.store.clone();
        let upload_path =
            run_blocking(move || store.write_upload(id, extension, &bytes)).await??;
        Stage::Stored.enter();

        let detector = Arc::clone(&self.detector);
        let span = tracing::Span::current();
        let inference = run_blocking(move || {
            let _entered = span.enter();
            let result = detector.infer(&upload_path)?;
            Stage::Inferred.enter();
            let rendered = detector.render(&result)?;
            Ok::<_, DetectorError>((rendered, result.len()))
        });

        // A timed-out task keeps running on the blocking pool, but its output
        // is dropped and nothing is persisted.
        let (rendered, detections) = tokio::time::timeout(self.inference_timeout, inference)
            .await
            .map_err(|_| PipelineError::Timeout(self.inference_timeout))???;
        Stage::Rendered.enter();

        let store = self.store.clone();
        run_blocking(move || store.write_prediction(id, extension, &rendered)).await??;
        Stage::Persisted.enter();

        let response = PredictionResponse {
            prediction_path: format!(
                "{}/{}",
                PREDICTIONS_URL_PREFIX,
                artifact_file_name(id, extension)
            ),
        };

        Ok((response, detections))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))
}
