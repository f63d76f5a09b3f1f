use crate::detection::{Detection, DetectionResult};
use crate::errors::DetectorError;
use crate::labels::Labels;
use ab_glyph::{FontArc, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const MIN_LINE_WIDTH: u32 = 2;
const MIN_FONT_PX: f32 = 12.0;
const CAPTION_PADDING: u32 = 2;

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE.txt`.
static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws detections over the source pixels.
///
/// Output depends only on the input result, the labels and the font, so
/// rendering the same result twice is pixel-identical.
pub struct Annotator {
    labels: Labels,
    font: Option<FontArc>,
}

impl Annotator {
    /// Captions use `font`, or the bundled DejaVu Sans when `None`.
    pub fn new(labels: Labels, font: Option<FontVec>) -> Self {
        let font = match font {
            Some(font) => Some(FontArc::new(font)),
            None => default_font(),
        };
        Self { labels, font }
    }

    pub fn load_font(path: &Path) -> Result<FontVec, DetectorError> {
        let font_err = |reason: String| DetectorError::Font {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| font_err(e.to_string()))?;
        FontVec::try_from_vec(bytes).map_err(|e| font_err(e.to_string()))
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn render(&self, result: &DetectionResult) -> RgbImage {
        let mut canvas = result.image.clone();
        let (width, height) = canvas.dimensions();
        let line_width = line_width(width, height);

        for detection in &result.detections {
            if detection.width().round() < 1.0 || detection.height().round() < 1.0 {
                continue;
            }

            let color = class_color(detection.class_id);
            draw_box(&mut canvas, detection, line_width, color);

            if let Some(font) = &self.font {
                self.draw_caption(&mut canvas, font, detection, line_width, color);
            }
        }

        canvas
    }

    fn draw_caption(
        &self,
        canvas: &mut RgbImage,
        font: &FontArc,
        detection: &Detection,
        line_width: u32,
        color: Rgb<u8>,
    ) {
        let text = format!(
            "{} {:.2}",
            self.labels.name(detection.class_id),
            detection.confidence
        );
        let scale = PxScale::from((line_width as f32 * 6.0).max(MIN_FONT_PX));
        let (text_width, text_height) = text_size(scale, font, &text);

        let bar_width = text_width.max(1) + 2 * CAPTION_PADDING;
        let bar_height = text_height.max(1) + 2 * CAPTION_PADDING;

        let x = detection.x1.round() as i32;
        let top = detection.y1.round() as i32;
        // Above the box when it fits, otherwise just inside its top edge
        let y = if top >= bar_height as i32 {
            top - bar_height as i32
        } else {
            top
        };

        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(bar_width, bar_height), color);
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            x + CAPTION_PADDING as i32,
            y + CAPTION_PADDING as i32,
            scale,
            font,
            &text,
        );
    }
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, line_width: u32, color: Rgb<u8>) {
    let x = detection.x1.round() as i32;
    let y = detection.y1.round() as i32;
    let box_width = detection.width().round() as u32;
    let box_height = detection.height().round() as u32;

    for inset in 0..line_width {
        let w = box_width.saturating_sub(2 * inset);
        let h = box_height.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x + inset as i32, y + inset as i32).of_size(w, h),
            color,
        );
    }
}

/// Stroke width scaled to the image, never thinner than `MIN_LINE_WIDTH`.
fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(MIN_LINE_WIDTH)
}

fn default_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEFAULT_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "Bundled caption font is unreadable; drawing boxes only");
            None
        }
    }
}

fn class_color(class_id: u16) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}
