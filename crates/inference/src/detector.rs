use crate::{
    annotate::Annotator,
    backend::{InferenceBackend, InferenceOutput},
    config::DetectorConfig,
    detection::DetectionResult,
    errors::DetectorError,
    labels::Labels,
    processing::{
        post::{PostProcessor, TransformParams},
        pre::PreProcessor,
    },
};
use image::{ImageReader, RgbImage};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// The capability the prediction pipeline depends on.
///
/// Implementations are shared across request handlers and must tolerate
/// concurrent calls.
pub trait Detector: Send + Sync {
    /// Decode the image at `image_path` and run detection on it.
    fn infer(&self, image_path: &Path) -> Result<DetectionResult, DetectorError>;

    /// Draw `result` over its source image.
    fn render(&self, result: &DetectionResult) -> Result<RgbImage, DetectorError>;
}

/// Decode an image, trusting its content over its file extension.
pub fn load_image(image_path: &Path) -> Result<RgbImage, DetectorError> {
    let image = ImageReader::open(image_path)
        .map_err(DetectorError::inference)?
        .with_guessed_format()
        .map_err(DetectorError::inference)?
        .decode()
        .map_err(DetectorError::inference)?;

    Ok(image.into_rgb8())
}

struct Engine<B> {
    backend: B,
    preprocessor: PreProcessor,
}

/// [`Detector`] backed by a loaded model.
///
/// The backend and its preprocessing buffers need exclusive access, so calls
/// to `infer` are serialized; rendering runs without the lock.
pub struct ModelDetector<B: InferenceBackend> {
    engine: Mutex<Engine<B>>,
    postprocessor: PostProcessor,
    annotator: Annotator,
    input_size: (u32, u32),
}

impl<B: InferenceBackend> ModelDetector<B> {
    /// Load weights, labels and font from `config`. Any failure here means
    /// the service must not start.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;

        let path = &config.model_path;
        let model_err = |reason: String| DetectorError::ModelLoad {
            path: path.clone(),
            reason,
        };

        if !path.is_file() {
            return Err(model_err("weights file not found".to_string()));
        }

        tracing::info!(path = %path.display(), "Loading detection model");
        let backend = B::load_model(path, config).map_err(|e| model_err(format!("{:#}", e)))?;

        Self::new(backend, config)
    }

    pub fn new(backend: B, config: &DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;

        let labels = match &config.labels_path {
            Some(path) => Labels::from_file(path)?,
            None => Labels::coco(),
        };
        let font = config
            .font_path
            .as_deref()
            .map(Annotator::load_font)
            .transpose()?;

        if font.is_none() {
            tracing::debug!("Using bundled caption font");
        }

        Ok(Self {
            engine: Mutex::new(Engine {
                backend,
                preprocessor: PreProcessor::new(config.input_size()),
            }),
            postprocessor: PostProcessor::new(config.confidence_threshold),
            annotator: Annotator::new(labels, font),
            input_size: config.input_size(),
        })
    }

    fn detect(&self, image: RgbImage) -> anyhow::Result<DetectionResult> {
        let (orig_width, orig_height) = image.dimensions();

        let (InferenceOutput { dets, logits }, letterbox) = {
            // A panic in an earlier call leaves the buffers reusable
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            let engine = &mut *engine;

            let (input, letterbox) = engine.preprocessor.preprocess_image(&image)?;
            let _infer_span = tracing::info_span!("model_inference").entered();
            (engine.backend.infer(&input)?, letterbox)
        };

        let transform = TransformParams {
            orig_width,
            orig_height,
            input_width: self.input_size.0,
            input_height: self.input_size.1,
            letterbox,
        };

        let detections =
            self.postprocessor
                .parse_detections(&dets.view(), &logits.view(), &transform)?;

        Ok(DetectionResult::new(image, detections))
    }
}

impl<B: InferenceBackend> Detector for ModelDetector<B> {
    #[tracing::instrument(skip_all, fields(path = %image_path.display()))]
    fn infer(&self, image_path: &Path) -> Result<DetectionResult, DetectorError> {
        let image = load_image(image_path)?;

        let result = self
            .detect(image)
            .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;

        tracing::debug!(detections = result.len(), "Inference complete");
        Ok(result)
    }

    fn render(&self, result: &DetectionResult) -> Result<RgbImage, DetectorError> {
        Ok(self.annotator.render(result))
    }
}
