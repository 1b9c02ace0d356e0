//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns one initialized inference backend and
//! runs the preprocess, infer, mask and apply pipeline. It is shared across
//! request handlers; inference is serialized through a mutex while
//! preprocessing and mask application run concurrently.

use crate::{
    config::{ExecutionProvider, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelManager, ModelSpec, PreprocessingConfig},
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, Letterbox, PreprocessingOptions},
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, instrument, span, Level};

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    /// ONNX Runtime when compiled in, Tract otherwise
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Tract
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type for the model
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the feature-enabled ONNX and Tract backends
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => Err(BgRemovalError::invalid_config(format!(
                "Backend '{other}' is not available in this build (enable the `{other}` feature)"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Configuration for the background removal processor
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Model folder and variant
    pub model_spec: ModelSpec,
    /// Backend type to use for inference
    pub backend_type: BackendType,
    /// Execution provider for the backend
    pub execution_provider: ExecutionProvider,
    /// Enable debug mode
    pub debug: bool,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Backend initialization view of this configuration
    #[must_use]
    pub fn to_removal_config(&self) -> RemovalConfig {
        RemovalConfig {
            execution_provider: self.execution_provider,
            debug: self.debug,
            intra_threads: self.intra_threads,
            inter_threads: self.inter_threads,
            model_spec: self.model_spec.clone(),
        }
    }

    /// Processor configuration from a removal config and backend choice
    #[must_use]
    pub fn from_removal_config(config: &RemovalConfig, backend_type: BackendType) -> Self {
        Self {
            model_spec: config.model_spec.clone(),
            backend_type,
            execution_provider: config.execution_provider,
            debug: config.debug,
            intra_threads: config.intra_threads,
            inter_threads: config.inter_threads,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_removal_config(&RemovalConfig::default(), BackendType::default())
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Build the processor configuration
    ///
    /// # Errors
    /// - Invalid thread counts
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.to_removal_config().validate()?;
        Ok(self.config)
    }
}

/// Background removal processor shared by all requests
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    backend: Mutex<Box<dyn InferenceBackend>>,
    preprocessing: PreprocessingConfig,
    model_load_ms: u64,
    model_load_reported: AtomicBool,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("preprocessing", &self.preprocessing)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Load the configured model and initialize its backend
    ///
    /// # Errors
    /// - Model folder loading failures
    /// - Backend type not compiled in
    /// - Backend initialization errors
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Load the configured model through a custom backend factory
    ///
    /// # Errors
    /// - Model folder loading failures
    /// - Backend creation or initialization errors
    pub fn with_factory(config: ProcessorConfig, factory: &dyn BackendFactory) -> Result<Self> {
        info!(
            backend = %config.backend_type,
            model = %config.model_spec.display_name(),
            provider = %config.execution_provider,
            "Initializing background removal processor"
        );
        let model_manager =
            ModelManager::from_spec(&config.model_spec, Some(&config.execution_provider))?;
        let backend = factory.create_backend(config.backend_type, model_manager)?;
        Self::with_backend(config, backend)
    }

    /// Wrap an existing backend, initializing it if needed
    ///
    /// # Errors
    /// - Backend initialization errors
    /// - Backend without a preprocessing configuration
    pub fn with_backend(config: ProcessorConfig, mut backend: Box<dyn InferenceBackend>) -> Result<Self> {
        let model_load_ms = backend
            .initialize(&config.to_removal_config())?
            .map_or(0, |d| d.as_millis() as u64);
        let preprocessing = backend.get_preprocessing_config()?;

        match backend.get_model_info() {
            Ok(model) => info!(
                model = %model.name,
                precision = %model.precision,
                input_shape = ?model.input_shape,
                model_load_ms,
                "Background removal processor initialized"
            ),
            Err(e) => debug!("Model info unavailable: {e}"),
        }

        Ok(Self {
            config,
            backend: Mutex::new(backend),
            preprocessing,
            model_load_ms,
            model_load_reported: AtomicBool::new(false),
        })
    }

    /// Re-run backend initialization; a no-op for an initialized backend
    ///
    /// # Errors
    /// - Backend initialization errors
    pub fn initialize(&self) -> Result<()> {
        let removal_config = self.config.to_removal_config();
        self.lock_backend().initialize(&removal_config)?;
        Ok(())
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Whether the backend reports itself initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_backend().is_initialized()
    }

    /// Model load time recorded at construction
    #[must_use]
    pub fn model_load_ms(&self) -> u64 {
        self.model_load_ms
    }

    /// Remove the background from encoded image bytes
    ///
    /// # Errors
    /// - Image decoding failures
    /// - Inference or mask generation errors
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<RemovalResult> {
        let image = image::load_from_memory(image_bytes).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode image from bytes: {e}"))
        })?;
        self.process_image(&image)
    }

    /// Remove the background from a decoded image
    ///
    /// # Errors
    /// - Preprocessing failures (zero-sized images)
    /// - Inference errors
    /// - Output tensors of unexpected shape
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let original_dimensions = image.dimensions();
        let mut timings = ProcessingTimings::default();
        if !self.model_load_reported.swap(true, Ordering::Relaxed) {
            timings.model_load_ms = self.model_load_ms;
        }

        let (letterbox, input_tensor) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let preprocessed = ImagePreprocessor::preprocess_image(
                image,
                &self.preprocessing,
                &PreprocessingOptions::default(),
            )?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            preprocessed
        };

        let output_tensor = {
            let _span = span!(Level::DEBUG, "inference").entered();
            let start = Instant::now();
            let output = self.lock_backend().infer(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            output
        };

        let (mask, result_image) = {
            let _span = span!(Level::DEBUG, "background_removal").entered();
            let start = Instant::now();
            let mask = Self::tensor_to_mask(&output_tensor, &letterbox, original_dimensions)?;
            let result = Self::apply_background_removal(image, &mask);
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            (mask, result)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        let result = RemovalResult::new(
            DynamicImage::ImageRgba8(result_image),
            mask,
            original_dimensions,
            timings,
        );
        debug!("{}", result.timing_summary());
        Ok(result)
    }

    fn lock_backend(&self) -> std::sync::MutexGuard<'_, Box<dyn InferenceBackend>> {
        // A panic inside infer leaves no partial backend state
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map a `(1, 1, h, w)` output tensor back onto the original image grid
    ///
    /// `letterbox` is the fit used during preprocessing. Outputs whose size
    /// differs from the input canvas are sampled proportionally.
    ///
    /// # Errors
    /// - Tensor not shaped `(1, 1, h, w)` or with a zero-sized plane
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        letterbox: &Letterbox,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (batch, channels, mask_height, mask_width) = tensor.dim();
        if batch != 1 || channels != 1 || mask_height == 0 || mask_width == 0 {
            return Err(BgRemovalError::processing(format!(
                "Invalid output tensor shape {:?}",
                tensor.shape()
            )));
        }

        let grid_x = mask_width as f32 / letterbox.canvas_width as f32;
        let grid_y = mask_height as f32 / letterbox.canvas_height as f32;

        let (orig_width, orig_height) = original_dimensions;
        let mut data = Vec::with_capacity(orig_width as usize * orig_height as usize);
        for y in 0..orig_height {
            let canvas_y = y as f32 * letterbox.scale + letterbox.offset_y as f32;
            let tensor_y = (canvas_y * grid_y).round() as usize;
            for x in 0..orig_width {
                let canvas_x = x as f32 * letterbox.scale + letterbox.offset_x as f32;
                let tensor_x = (canvas_x * grid_x).round() as usize;
                let value = tensor
                    .get([0, 0, tensor_y, tensor_x])
                    .copied()
                    .unwrap_or(0.0);
                data.push((value.clamp(0.0, 1.0) * 255.0) as u8);
            }
        }

        Ok(SegmentationMask::new(data, original_dimensions))
    }

    /// Use the mask as alpha channel; fully transparent pixels are zeroed
    #[must_use]
    pub fn apply_background_removal(image: &DynamicImage, mask: &SegmentationMask) -> RgbaImage {
        let mut rgba = image.to_rgba8();
        for (pixel, &alpha) in rgba.pixels_mut().zip(mask.data.iter()) {
            *pixel = if alpha > 0 {
                image::Rgba([pixel[0], pixel[1], pixel[2], alpha])
            } else {
                image::Rgba([0, 0, 0, 0])
            };
        }
        rgba
    }
}
