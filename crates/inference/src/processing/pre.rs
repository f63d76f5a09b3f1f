use crate::config::DEFAULT_INPUT_SIZE;
use common::span;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Letterbox placement of the source image inside the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub struct PreProcessor {
    pub input_size: (u32, u32),
    rgb_buffer: Vec<u8>,
    letterboxed_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::new(),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    /// Letterbox `image` into the model input size and normalize it into a
    /// `[1, 3, H, W]` tensor.
    pub fn preprocess_image(
        &mut self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, Letterbox)> {
        let _s = span!("preprocess_image");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        tracing::trace!(width, height, "Preprocessing image dimensions");

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(image.as_raw());

        let (letterbox, resized) = self.resize_and_letterbox(width, height)?;

        let input = Self::normalize(&resized)?;

        Ok((input, letterbox))
    }

    fn resize_and_letterbox(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Letterbox, Image<'_>)> {
        let _s = span!("resize_and_letterbox");

        let scale =
            (self.input_size.0 as f32 / width as f32).min(self.input_size.1 as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, self.input_size.0);
        let new_height = ((height as f32 * scale) as u32).clamp(1, self.input_size.1);

        let offset_x = (self.input_size.0 - new_width) / 2;
        let offset_y = (self.input_size.1 - new_height) / 2;

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = self.input_size.0 * 3;
        let row_bytes = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        let final_img = Image::from_slice_u8(
            self.input_size.0,
            self.input_size.1,
            &mut self.letterboxed_buffer,
            PixelType::U8x3,
        )?;

        let letterbox = Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        };

        Ok((letterbox, final_img))
    }

    fn normalize(image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            let r = px[0] as f32 / 255.0;
            let g = px[1] as f32 / 255.0;
            let b = px[2] as f32 / 255.0;

            output[i] = (r - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
            output[i + spatial] = (g - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
            output[i + 2 * spatial] = (b - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Test RGB preprocessing
    #[test]
    fn test_rgb_preprocessing() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 0]));
        image.put_pixel(0, 1, Rgb([0, 0, 255]));
        image.put_pixel(1, 1, Rgb([255, 255, 255]));

        let mut preprocessor = PreProcessor::default();
        let result = preprocessor.preprocess_image(&image);

        assert!(result.is_ok(), "RGB preprocessing should succeed");
        let (output, _) = result.unwrap();
        assert_eq!(output.shape(), &[1, 3, 640, 640]);
    }

    /// Test that an empty image is rejected instead of dividing by zero
    #[test]
    fn test_empty_image_rejected() {
        let image = RgbImage::new(0, 0);

        let mut preprocessor = PreProcessor::default();
        let result = preprocessor.preprocess_image(&image);

        assert!(result.is_err(), "Empty image should return error");
        assert!(
            result.unwrap_err().to_string().contains("empty"),
            "Error should mention the empty image"
        );
    }

    /// Test letterboxing preserves aspect ratio
    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        // 800x600 image (4:3 aspect ratio)
        let image = RgbImage::from_pixel(800, 600, Rgb([128, 128, 128]));

        let mut preprocessor = PreProcessor::new((512, 512));
        let (output, letterbox) = preprocessor.preprocess_image(&image).unwrap();

        // Scale should be min(512/800, 512/600) = 512/800 = 0.64
        assert_eq!(letterbox.scale, 0.64, "Scale should preserve aspect ratio");

        // Resized dimensions: 800*0.64 = 512, 600*0.64 = 384
        // Offset X: (512 - 512) / 2 = 0
        // Offset Y: (512 - 384) / 2 = 64
        assert_eq!(letterbox.offset_x, 0.0, "X offset should be 0 for wide image");
        assert_eq!(letterbox.offset_y, 64.0, "Y offset should center vertically");

        assert_eq!(output.shape(), &[1, 3, 512, 512]);
    }

    /// Test that the preprocessor can be reused across differently sized images
    #[test]
    fn test_reuse_across_image_sizes() {
        let mut preprocessor = PreProcessor::new((64, 64));

        let large = RgbImage::from_pixel(300, 100, Rgb([10, 20, 30]));
        let small = RgbImage::from_pixel(10, 10, Rgb([200, 100, 50]));

        let (_, first) = preprocessor.preprocess_image(&large).unwrap();
        let (output, second) = preprocessor.preprocess_image(&small).unwrap();

        assert_ne!(first, second, "Letterbox should follow the current image");
        assert_eq!(output.shape(), &[1, 3, 64, 64]);
    }

    /// Test ImageNet normalization is applied
    #[test]
    fn test_imagenet_normalization() {
        // Mid gray 128
        let image = RgbImage::from_pixel(2, 2, Rgb([128, 128, 128]));

        let mut preprocessor = PreProcessor::new((512, 512));
        let (output, _) = preprocessor.preprocess_image(&image).unwrap();

        assert_eq!(output.shape(), &[1, 3, 512, 512]);

        // For gray 128 (0.502) with ImageNet norm:
        //   R: (0.502 - 0.485) / 0.229 ≈ 0.074
        //   G: (0.502 - 0.456) / 0.224 ≈ 0.205
        //   B: (0.502 - 0.406) / 0.225 ≈ 0.427
        let r = output[[0, 0, 256, 256]];
        let g = output[[0, 1, 256, 256]];
        let b = output[[0, 2, 256, 256]];

        assert!(
            (r - 0.074).abs() < 0.1,
            "R channel should be ~0.074 (got {})",
            r
        );
        assert!(
            (g - 0.205).abs() < 0.1,
            "G channel should be ~0.205 (got {})",
            g
        );
        assert!(
            (b - 0.427).abs() < 0.1,
            "B channel should be ~0.427 (got {})",
            b
        );
    }
}
