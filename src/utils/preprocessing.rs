//! Image preprocessing for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Aspect-preserving fit of an image into the model's input canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor applied to the original image
    pub scale: f32,
    /// Resized image dimensions
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Centering offsets inside the canvas
    pub offset_x: u32,
    pub offset_y: u32,
    /// Canvas dimensions
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Letterbox {
    /// Fit `(width, height)` into a `(canvas_width, canvas_height)` canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    pub fn fit(
        (width, height): (u32, u32),
        (canvas_width, canvas_height): (u32, u32),
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::processing("Image has zero width or height"));
        }
        if canvas_width == 0 || canvas_height == 0 {
            return Err(BgRemovalError::invalid_config("Model target size must be non-zero"));
        }

        let scale = (canvas_width as f32 / width as f32).min(canvas_height as f32 / height as f32);
        // Round, then clamp so 1-pixel-wide inputs survive and rounding never exceeds the canvas
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, canvas_width);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, canvas_height);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (canvas_width - scaled_width) / 2,
            offset_y: (canvas_height - scaled_height) / 2,
            canvas_width,
            canvas_height,
        })
    }
}

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
        }
    }
}

/// Image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image into a normalized NCHW tensor
    ///
    /// Converts to RGB, resizes keeping the aspect ratio, centers the result
    /// on a padded canvas of the model's target size and normalizes each
    /// channel as `(v / 255 - mean) / std`.
    ///
    /// # Errors
    /// - Zero-sized image or target size
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<(Letterbox, Array4<f32>)> {
        let [target_height, target_width] = preprocessing_config.target_size;

        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::fit(rgb_image.dimensions(), (target_width, target_height))?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = options.padding_color;
        let mut canvas: RgbImage =
            ImageBuffer::from_pixel(target_width, target_height, image::Rgb(padding));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        Ok((letterbox, tensor))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let pixel = canvas.get_pixel(x as u32, y as u32);
                (f32::from(pixel.0[c]) / 255.0 - mean[c]) / std[c]
            },
        )
    }

    /// Preprocess with default options, returning only the tensor
    ///
    /// # Errors
    /// - Zero-sized image or target size
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let (_, tensor) =
            Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())?;
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config(size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
        }
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_preprocess_for_inference_shape() {
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&solid(100, 100, [255, 0, 0]), &config(64))
                .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    }

    #[test]
    fn test_normalization_values() {
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&solid(64, 64, [255, 0, 0]), &config(64))
                .unwrap();
        // (1.0 - 0.5) / 0.5 = 1.0 for red, (0.0 - 0.5) / 0.5 = -1.0 for green/blue
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 10]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 10, 10]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wide_image_is_padded_vertically() {
        let (letterbox, tensor) = ImagePreprocessor::preprocess_image(
            &solid(200, 100, [0, 0, 0]),
            &config(100),
            &PreprocessingOptions::default(),
        )
        .unwrap();

        assert_eq!(letterbox.scaled_width, 100);
        assert_eq!(letterbox.scaled_height, 50);
        assert_eq!(letterbox.offset_x, 0);
        assert_eq!(letterbox.offset_y, 25);
        // Top rows are white padding, center rows are the black image
        assert!((tensor[[0, 0, 0, 50]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 50, 50]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_small_image_is_upscaled() {
        let letterbox = Letterbox::fit((10, 20), (100, 100)).unwrap();
        assert!((letterbox.scale - 5.0).abs() < f32::EPSILON);
        assert_eq!((letterbox.scaled_width, letterbox.scaled_height), (50, 100));
        assert_eq!((letterbox.offset_x, letterbox.offset_y), (25, 0));
    }

    #[test]
    fn test_extreme_aspect_keeps_one_pixel() {
        let letterbox = Letterbox::fit((10_000, 1), (64, 64)).unwrap();
        assert_eq!(letterbox.scaled_height, 1);
        assert_eq!(letterbox.scaled_width, 64);
    }

    #[test]
    fn test_zero_target_rejected() {
        assert!(Letterbox::fit((10, 10), (0, 10)).is_err());
    }
}
