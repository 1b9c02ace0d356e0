#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # IMG.LY Background Removal Server
//!
//! HTTP service removing image backgrounds with ONNX Runtime or Tract
//! backends, serving `ISNet`/`BiRefNet` style segmentation models from a local
//! model folder.
//!
//! ## Endpoints
//!
//! - `POST /api/remove-background`: multipart file field `image`, answers with
//!   an RGBA PNG whose alpha channel is the predicted foreground mask
//! - `GET /api/health`: liveness probe answering `{"status":"ok"}`
//!
//! ## Feature Flags
//!
//! - `tract` (default): pure Rust backend
//! - `onnx`: ONNX Runtime backend with CUDA and `CoreML` execution providers
//! - `webp-support` (default): WebP input support
//! - `tracing-json`: JSON log output
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use imgly_bgremove_server::{
//!     BackendType, BackgroundRemovalProcessor, ModelSpec, ProcessorConfig,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = ProcessorConfig::builder()
//!     .model_spec(ModelSpec {
//!         path: "models/isnet-general-onnx".into(),
//!         variant: None,
//!     })
//!     .backend_type(BackendType::Tract)
//!     .build()?;
//! let processor = BackgroundRemovalProcessor::new(config)?;
//! let result = processor.process_bytes(&std::fs::read("input.jpg")?)?;
//! std::fs::write("output.png", result.to_png_bytes()?)?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use backends::*;
pub use config::{ExecutionProvider, LogFormat, RemovalConfig, ServerArgs, ServerConfig};
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, ModelSpec, PreprocessingConfig};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
    ProcessorConfig, ProcessorConfigBuilder,
};
pub use server::{create_router, ApiError, AppState};
pub use tracing_config::TracingConfig;
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::{ImagePreprocessor, Letterbox, PreprocessingOptions};
