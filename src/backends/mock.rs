//! Mock backend implementation for testing and debugging

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock backend producing a soft circular foreground mask
///
/// Useful for exercising the full pipeline without model files.
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    fail_init: bool,
    fail_inference: bool,
    load_time: Duration,
    infer_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a mock backend with a 320x320 model shape
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(320)
    }

    /// Create a mock backend with a square `size x size` model shape
    #[must_use]
    pub fn with_size(size: u32) -> Self {
        let s = size as usize;
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-model".to_string(),
                precision: "fp32".to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, s, s),
                output_shape: (1, 1, s, s),
            },
            preprocessing_config: PreprocessingConfig {
                target_size: [size, size],
                normalization_mean: [0.485, 0.456, 0.406],
                normalization_std: [0.229, 0.224, 0.225],
            },
            fail_init: false,
            fail_inference: false,
            load_time: Duration::from_millis(0),
            infer_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock backend whose initialization always fails
    #[must_use]
    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::new()
        }
    }

    /// Mock backend whose inference always fails
    #[must_use]
    pub fn failing_inference() -> Self {
        Self {
            fail_inference: true,
            ..Self::new()
        }
    }

    /// Report `load_time` as the model load duration on initialization
    #[must_use]
    pub fn with_load_time(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }

    /// Shared counter of `infer` calls, survives moving the backend into a processor
    #[must_use]
    pub fn infer_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.infer_calls)
    }

    fn circular_mask(&self) -> Array4<f32> {
        let (_, _, height, width) = self.model_info.output_shape;
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(10.0);

        Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < radius {
                ((radius - distance) / radius * 4.0).min(1.0)
            } else {
                0.0
            }
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(self.load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);

        if !self.initialized {
            return Err(BgRemovalError::inference("Mock backend not initialized"));
        }
        if self.fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failed"));
        }

        let (_, channels, height, width) = self.model_info.input_shape;
        if input.dim() != (1, channels, height, width) {
            return Err(BgRemovalError::inference(format!(
                "Unexpected input shape {:?}, expected {:?}",
                input.dim(),
                self.model_info.input_shape
            )));
        }

        Ok(self.circular_mask())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.output_shape
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockBackend::with_size(64);
        let input = Array4::<f32>::zeros((1, 3, 64, 64));
        assert!(backend.infer(&input).is_err());

        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_some());
        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_none());
        assert!(backend.is_initialized());

        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, 64, 64));
        assert_eq!(backend.infer_counter().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mock_mask_is_centered() {
        let mut backend = MockBackend::with_size(64);
        backend.initialize(&RemovalConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 64, 64))).unwrap();

        assert!((output[[0, 0, 32, 32]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_mock_rejects_wrong_shape() {
        let mut backend = MockBackend::with_size(64);
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 32, 32))).is_err());
    }

    #[test]
    fn test_failing_variants() {
        assert!(MockBackend::failing_init()
            .initialize(&RemovalConfig::default())
            .is_err());

        let mut backend = MockBackend::failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 320, 320))).is_err());
    }
}
