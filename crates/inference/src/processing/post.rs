use crate::detection::Detection;
use crate::processing::pre::Letterbox;

/// Maps model-space boxes back onto the original image.
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub letterbox: Letterbox,
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Decode DETR-style outputs into detections in original image pixels.
    ///
    /// `dets` is `[1, Q, 4]` normalized cxcywh, `logits` is `[1, Q, C]` with
    /// class 0 reserved for background.
    #[tracing::instrument(skip_all)]
    pub fn parse_detections(
        &self,
        dets: &ndarray::ArrayViewD<f32>,
        logits: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<Detection>> {
        let (num_queries, num_classes) = validate_shapes(dets.shape(), logits.shape())?;

        let mut detections = Vec::new();

        for i in 0..num_queries {
            // Argmax over foreground classes; index 0 is background
            let mut max_logit = f32::NEG_INFINITY;
            let mut class_idx = 1usize;
            for c in 1..num_classes {
                let logit = logits[[0, i, c]];
                if logit > max_logit {
                    max_logit = logit;
                    class_idx = c;
                }
            }

            let confidence = sigmoid(max_logit);

            if confidence < self.confidence_threshold {
                continue;
            }

            let (x1_norm, y1_norm, x2_norm, y2_norm) = cxcywh_to_xyxy(
                dets[[0, i, 0]],
                dets[[0, i, 1]],
                dets[[0, i, 2]],
                dets[[0, i, 3]],
            );

            let to_orig_x = |v: f32| {
                ((v * transform.input_width as f32 - transform.letterbox.offset_x)
                    / transform.letterbox.scale)
                    .clamp(0.0, transform.orig_width as f32)
            };
            let to_orig_y = |v: f32| {
                ((v * transform.input_height as f32 - transform.letterbox.offset_y)
                    / transform.letterbox.scale)
                    .clamp(0.0, transform.orig_height as f32)
            };

            detections.push(Detection {
                x1: to_orig_x(x1_norm),
                y1: to_orig_y(y1_norm),
                x2: to_orig_x(x2_norm),
                y2: to_orig_y(y2_norm),
                confidence,
                class_id: (class_idx - 1) as u16,
            });
        }

        Ok(detections)
    }
}

fn validate_shapes(dets: &[usize], logits: &[usize]) -> anyhow::Result<(usize, usize)> {
    match (dets, logits) {
        ([1, q, 4], [1, lq, c]) if q == lq && *c >= 2 => Ok((*q, *c)),
        _ => anyhow::bail!(
            "Unexpected model output shapes: dets {:?}, logits {:?}",
            dets,
            logits
        ),
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
