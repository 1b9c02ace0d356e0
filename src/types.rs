//! Core types for background removal operations

use crate::error::Result;
use image::DynamicImage;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The processed RGBA image with background removed
    pub image: DynamicImage,

    /// The segmentation mask used for removal
    pub mask: SegmentationMask,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Per-stage timings
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(
        image: DynamicImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            timings,
        }
    }

    /// Encode the result as PNG with alpha channel
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// One-line timing summary for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        let mut summary = format!(
            "Total: {}ms | Preprocess: {}ms | Inference: {}ms | Postprocess: {}ms",
            t.total_ms, t.preprocessing_ms, t.inference_ms, t.postprocessing_ms
        );
        if t.model_load_ms > 0 {
            summary.push_str(&format!(" | Model load: {}ms", t.model_load_ms));
        }
        summary
    }
}

/// Grayscale segmentation mask, one byte per pixel (0 = background, 255 = foreground)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }
}

/// Timing breakdown for one removal, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingTimings {
    /// Model loading time, reported on the first removal after startup only
    pub model_load_ms: u64,

    /// Image preprocessing (resize, normalize, tensor conversion)
    pub preprocessing_ms: u64,

    /// Backend inference execution, including time waiting for the backend lock
    pub inference_ms: u64,

    /// Postprocessing (mask generation, alpha application)
    pub postprocessing_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn result(timings: ProcessingTimings) -> RemovalResult {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 128]));
        RemovalResult::new(
            DynamicImage::ImageRgba8(rgba),
            SegmentationMask::new(vec![128; 6], (3, 2)),
            (3, 2),
            timings,
        )
    }

    #[test]
    fn test_to_png_bytes_decodes() {
        let png = result(ProcessingTimings::default()).to_png_bytes().unwrap();
        assert_eq!(
            image::guess_format(&png).unwrap(),
            image::ImageFormat::Png
        );
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0), &Rgba([10, 20, 30, 128]));
    }

    #[test]
    fn test_timing_summary_mentions_model_load_when_present() {
        let warm = result(ProcessingTimings {
            total_ms: 12,
            ..ProcessingTimings::default()
        });
        assert!(warm.timing_summary().starts_with("Total: 12ms"));
        assert!(!warm.timing_summary().contains("Model load"));

        let cold = result(ProcessingTimings {
            model_load_ms: 340,
            ..ProcessingTimings::default()
        });
        assert!(cold.timing_summary().ends_with("Model load: 340ms"));
    }
}
