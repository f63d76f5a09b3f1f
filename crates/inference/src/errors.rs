use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Failed to read labels from {path}: {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to load font from {path}: {reason}")]
    Font { path: PathBuf, reason: String },

    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

impl DetectorError {
    pub fn inference(err: impl std::fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = DetectorError::ModelLoad {
            path: PathBuf::from("weights/best.onnx"),
            reason: "file not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load model from weights/best.onnx: file not found"
        );

        let err = DetectorError::inference("truncated JPEG");
        assert_eq!(err.to_string(), "Inference failed: truncated JPEG");
    }

    #[test]
    fn test_labels_error_keeps_io_source() {
        let err = DetectorError::Labels {
            path: PathBuf::from("labels.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };

        let source = std::error::Error::source(&err).expect("io source should be attached");
        assert_eq!(source.to_string(), "missing");
    }
}
