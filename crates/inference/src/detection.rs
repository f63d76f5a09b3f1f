use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Detection result with bounding box coordinates (original image pixels),
/// confidence, and class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u16,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// Output of a single `infer` call: the decoded source image and what was
/// found in it. Rendering needs the original pixels, so they travel together.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub image: RgbImage,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(image: RgbImage, detections: Vec<Detection>) -> Self {
        Self { image, detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
