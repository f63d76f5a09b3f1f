use crate::errors::DetectorError;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

/// Detector settings. Every field has a default, so a partially specified
/// source deserializes cleanly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    pub input_name: String,
    pub dets_output: String,
    pub logits_output: String,
    /// Newline-separated class names; COCO names are used when unset.
    pub labels_path: Option<PathBuf>,
    /// TTF/OTF font used for box captions instead of the bundled DejaVu Sans.
    pub font_path: Option<PathBuf>,
}

impl DetectorConfig {
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    /// Reject settings the model can never run with.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectorError::InvalidConfig(format!(
                "input size must be non-zero (got {}x{})",
                self.input_width, self.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::InvalidConfig(format!(
                "confidence_threshold must be within 0..=1 (got {})",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("weights/best.onnx"),
            input_width: DEFAULT_INPUT_SIZE.0,
            input_height: DEFAULT_INPUT_SIZE.1,
            confidence_threshold: 0.5,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,
            input_name: "input".to_string(),
            dets_output: "dets".to_string(),
            logits_output: "labels".to_string(),
            labels_path: None,
            font_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_input_size() {
        let config = DetectorConfig {
            input_height: 0,
            ..DetectorConfig::default()
        };

        match config.validate() {
            Err(DetectorError::InvalidConfig(msg)) => assert!(msg.contains("640x0"), "{}", msg),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let config = DetectorConfig {
            confidence_threshold: 1.5,
            ..DetectorConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(DetectorError::InvalidConfig(_))
        ));
    }
}
