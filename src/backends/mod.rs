//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (GPU acceleration, feature `onnx`)
//! - Tract backend (pure Rust, feature `tract`)
//! - Mock backend (synthetic masks, for tests and smoke runs without a model)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
