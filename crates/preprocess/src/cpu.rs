use crate::PreprocessResult;
use crate::config::{DEFAULT_INPUT_SIZE, LETTERBOX_COLOR};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};
use std::default::Default;

const PIXEL_SCALE: f32 = 1.0 / 255.0;

pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
}

/// Placement of the resized image inside the letterboxed input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    new_width: u32,
    new_height: u32,
    offset_x: u32,
    offset_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: (u32, u32)) -> Self {
        let scale =
            (input_size.0 as f32 / width as f32).min(input_size.1 as f32 / height as f32);

        // Extreme aspect ratios can round a side to zero; keep at least one pixel.
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, input_size.0);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, input_size.1);

        Self {
            scale,
            new_width,
            new_height,
            offset_x: (input_size.0 - new_width) / 2,
            offset_y: (input_size.1 - new_height) / 2,
        }
    }
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    /// Letterbox tightly packed RGB pixels (HWC) into the model input size and
    /// convert them to a normalized NCHW tensor.
    pub fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("preprocess_image");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Image has no pixels ({}x{})", width, height);
        }

        let expected_size = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let letterbox = self.resize_and_letterbox(pixels, width, height)?;
        let tensor = self.normalize()?;

        Ok(PreprocessResult {
            tensor,
            scale: letterbox.scale,
            offset_x: letterbox.offset_x as f32,
            offset_y: letterbox.offset_y as f32,
        })
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<Letterbox> {
        let _s = span!("resize_and_letterbox");

        let letterbox = Letterbox::fit(width, height, self.input_size);

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(letterbox.new_width, letterbox.new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = (self.input_size.0 * 3) as usize;
        let row_bytes = (letterbox.new_width * 3) as usize;

        for y in 0..letterbox.new_height as usize {
            let src_row = y * row_bytes;
            let dst_row =
                (y + letterbox.offset_y as usize) * stride + letterbox.offset_x as usize * 3;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(letterbox)
    }

    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let width = self.input_size.0 as usize;
        let height = self.input_size.1 as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 * PIXEL_SCALE;
            output[i + spatial] = px[1] as f32 * PIXEL_SCALE;
            output[i + 2 * spatial] = px[2] as f32 * PIXEL_SCALE;
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        rgb.iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect()
    }

    /// Test RGB preprocessing
    #[test]
    fn test_rgb_preprocessing() {
        let pixels = vec![
            255, 0, 0, // Red pixel
            0, 255, 0, // Green pixel
            0, 0, 255, // Blue pixel
            255, 255, 255, // White pixel
        ];

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 2, 2);

        assert!(result.is_ok(), "RGB preprocessing should succeed");
        let output = result.unwrap();
        assert_eq!(output.tensor.shape(), &[1, 3, 640, 640]);
        assert!((output.scale - 320.0).abs() < 1e-3);
    }

    /// Test buffer size mismatch detection
    #[test]
    fn test_buffer_size_mismatch_detection() {
        let pixels = vec![0u8; 200]; // Wrong size for 10x10

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 10, 10);

        assert!(result.is_err(), "Size mismatch should return error");
        assert!(
            result.unwrap_err().to_string().contains("mismatch"),
            "Error should mention mismatch"
        );
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let mut preprocessor = CpuPreProcessor::default();
        let err = preprocessor.preprocess(&[], 0, 0).unwrap_err();
        assert!(err.to_string().contains("no pixels"));
    }

    /// Test letterboxing preserves aspect ratio
    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        // 800x600 image (4:3 aspect ratio)
        let pixels = solid_image(800, 600, [128, 128, 128]);

        let mut preprocessor = CpuPreProcessor::default();
        let output = preprocessor.preprocess(&pixels, 800, 600).unwrap();

        // Scale = min(640/800, 640/600) = 0.8, resized to 640x480
        assert!((output.scale - 0.8).abs() < 1e-6, "Scale should preserve aspect ratio");
        assert_eq!(output.offset_x, 0.0, "X offset should be 0 for wide image");
        assert_eq!(output.offset_y, 80.0, "Y offset should center vertically");
        assert_eq!(output.tensor.shape(), &[1, 3, 640, 640]);
    }

    #[test]
    fn test_tall_image_is_centered_horizontally() {
        let pixels = solid_image(300, 600, [10, 20, 30]);

        let mut preprocessor = CpuPreProcessor::new((640, 640));
        let output = preprocessor.preprocess(&pixels, 300, 600).unwrap();

        // Scale = 640/600, resized to 320x640
        assert_eq!(output.offset_x, 160.0);
        assert_eq!(output.offset_y, 0.0);
    }

    #[test]
    fn test_extreme_aspect_ratio_keeps_one_pixel() {
        let letterbox = Letterbox::fit(10_000, 1, (640, 640));
        assert_eq!(letterbox.new_width, 640);
        assert_eq!(letterbox.new_height, 1);
        assert_eq!(letterbox.offset_y, 319);
    }

    /// Pixels are scaled to [0, 1] without mean/std normalization
    #[test]
    fn test_unit_scale_normalization_and_padding() {
        let pixels = solid_image(800, 600, [255, 128, 0]);

        let mut preprocessor = CpuPreProcessor::new((640, 640));
        let output = preprocessor.preprocess(&pixels, 800, 600).unwrap();
        let tensor = &output.tensor;

        // Inside the image area
        assert!((tensor[[0, 0, 320, 320]] - 1.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 320, 320]] - 128.0 / 255.0).abs() < 1e-2);
        assert!(tensor[[0, 2, 320, 320]].abs() < 1e-3);

        // Padding band above the image keeps the letterbox grey in every channel
        let pad = LETTERBOX_COLOR as f32 / 255.0;
        for c in 0..3 {
            assert!(
                (tensor[[0, c, 10, 320]] - pad).abs() < 1e-6,
                "channel {} should hold padding value",
                c
            );
        }
    }

    #[test]
    fn test_buffer_is_reset_between_calls() {
        let mut preprocessor = CpuPreProcessor::new((64, 64));

        // Square image fills the whole input
        let white = solid_image(64, 64, [255, 255, 255]);
        preprocessor.preprocess(&white, 64, 64).unwrap();

        // Wide image leaves padding rows that must not contain stale white pixels
        let black = solid_image(64, 32, [0, 0, 0]);
        let output = preprocessor.preprocess(&black, 64, 32).unwrap();

        let pad = LETTERBOX_COLOR as f32 / 255.0;
        assert!((output.tensor[[0, 0, 0, 0]] - pad).abs() < 1e-6);
        assert!(output.tensor[[0, 0, 32, 32]].abs() < 1e-6);
    }
}
