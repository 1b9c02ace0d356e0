//! Model folder loading and variant resolution
//!
//! Two on-disk layouts are understood:
//!
//! - `HuggingFace`: `config.json`, `preprocessor_config.json` and an `onnx/`
//!   directory holding `model.onnx` (fp32) and/or `model_fp16.onnx` (fp16).
//! - Legacy: a single `model.json` describing variants, shapes and
//!   preprocessing, next to `model_<variant>.onnx` files.

use crate::config::ExecutionProvider;
use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which model folder to load and, optionally, which precision variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub variant: Option<String>,
}

impl ModelSpec {
    /// Display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "external:{}",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        )
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Preprocessing parameters, normalization in the 0-1 range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Target tensor size `[height, width]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
struct HfModelConfig {
    #[serde(default)]
    model_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HfSize {
    height: u32,
    width: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct HfPreprocessorConfig {
    size: HfSize,
    /// Mean in the 0-255 range
    image_mean: Vec<f64>,
    /// Standard deviation in the 0-255 range
    image_std: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyNormalization {
    mean: Vec<f32>,
    std: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyPreprocessing {
    target_size: [u32; 2],
    normalization: LegacyNormalization,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyVariant {
    /// ONNX file relative to the model folder, `model_<variant>.onnx` when absent
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    input_shape: Option<[usize; 4]>,
    #[serde(default)]
    output_shape: Option<[usize; 4]>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyModelConfig {
    name: String,
    variants: BTreeMap<String, LegacyVariant>,
    preprocessing: LegacyPreprocessing,
}

#[derive(Debug, Clone)]
enum ModelFormat {
    HuggingFace {
        config: HfModelConfig,
        preprocessor: HfPreprocessorConfig,
    },
    Legacy(LegacyModelConfig),
}

/// Loaded model folder with a resolved variant
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    format: ModelFormat,
    variant: String,
}

impl ModelManager {
    /// Load a model folder, resolving the variant for the given execution provider
    ///
    /// # Errors
    /// - Model path does not exist or is not a directory
    /// - Neither layout's configuration files are present or they fail to parse
    /// - No ONNX files, or the requested variant is unavailable
    pub fn from_spec(
        spec: &ModelSpec,
        execution_provider: Option<&ExecutionProvider>,
    ) -> Result<Self> {
        let model_path = spec.path.clone();

        if !model_path.exists() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model path does not exist: {}",
                model_path.display()
            )));
        }
        if !model_path.is_dir() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model path must be a directory: {}",
                model_path.display()
            )));
        }

        let hf_config = model_path.join("config.json");
        let hf_preprocessor = model_path.join("preprocessor_config.json");
        let legacy_config = model_path.join("model.json");

        let (format, available) = if hf_config.exists() && hf_preprocessor.exists() {
            let config: HfModelConfig = read_json(&hf_config)?;
            let preprocessor: HfPreprocessorConfig = read_json(&hf_preprocessor)?;
            if preprocessor.image_mean.len() < 3 || preprocessor.image_std.len() < 3 {
                return Err(BgRemovalError::invalid_config(
                    "image_mean and image_std must have at least 3 values",
                ));
            }
            let available = scan_onnx_variants(&model_path.join("onnx"))?;
            (
                ModelFormat::HuggingFace {
                    config,
                    preprocessor,
                },
                available,
            )
        } else if legacy_config.exists() {
            let config: LegacyModelConfig = read_json(&legacy_config)?;
            let norm = &config.preprocessing.normalization;
            if norm.mean.len() < 3 || norm.std.len() < 3 {
                return Err(BgRemovalError::invalid_config(
                    "Normalization mean and std must have at least 3 values",
                ));
            }
            let available: Vec<String> = config.variants.keys().cloned().collect();
            (ModelFormat::Legacy(config), available)
        } else {
            return Err(BgRemovalError::invalid_config(format!(
                "No valid model configuration found in: {}. Expected either model.json (legacy) or config.json + preprocessor_config.json (HuggingFace)",
                model_path.display()
            )));
        };

        let variant = resolve_variant(&available, spec.variant.as_deref(), execution_provider)
            .map_err(|msg| {
                BgRemovalError::model_error_with_context(
                    "load variant",
                    &model_path,
                    &msg,
                    &["verify model files are complete"],
                )
            })?;

        log::debug!(
            "Resolved model variant '{variant}' from {available:?} in {}",
            model_path.display()
        );

        Ok(Self {
            model_path,
            format,
            variant,
        })
    }

    /// Resolved precision variant
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Path of the ONNX file for the resolved variant
    #[must_use]
    pub fn get_model_path(&self) -> PathBuf {
        match &self.format {
            ModelFormat::HuggingFace { .. } => {
                let onnx_dir = self.model_path.join("onnx");
                match self.variant.as_str() {
                    "fp16" => onnx_dir.join("model_fp16.onnx"),
                    _ => onnx_dir.join("model.onnx"),
                }
            },
            ModelFormat::Legacy(config) => {
                match config.variants.get(&self.variant).and_then(|v| v.file.as_deref()) {
                    Some(file) => self.model_path.join(file),
                    None => self
                        .model_path
                        .join(format!("model_{variant}.onnx", variant = self.variant)),
                }
            },
        }
    }

    /// Read the ONNX bytes for the resolved variant
    ///
    /// # Errors
    /// - Model file missing or unreadable
    pub fn load_model(&self) -> Result<Vec<u8>> {
        let path = self.get_model_path();
        if !path.exists() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        fs::read(&path).map_err(|e| BgRemovalError::model(format!("Failed to read model file: {e}")))
    }

    /// Model metadata
    ///
    /// # Errors
    /// - Model file metadata unreadable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(self.get_model_path())
            .map(|m| m.len() as usize)
            .map_err(|e| BgRemovalError::model(format!("Failed to stat model file: {e}")))?;

        Ok(match &self.format {
            ModelFormat::HuggingFace {
                config,
                preprocessor,
            } => {
                let height = preprocessor.size.height as usize;
                let width = preprocessor.size.width as usize;
                ModelInfo {
                    name: format!(
                        "{}-{}",
                        config.model_type.as_deref().unwrap_or("unknown"),
                        self.variant
                    ),
                    precision: self.variant.clone(),
                    size_bytes,
                    input_shape: (1, 3, height, width),
                    output_shape: (1, 1, height, width),
                }
            },
            ModelFormat::Legacy(config) => {
                let [h, w] = config.preprocessing.target_size.map(|v| v as usize);
                let variant = config.variants.get(&self.variant);
                let shape = |s: Option<[usize; 4]>, default| {
                    s.map_or(default, |[n, c, h, w]| (n, c, h, w))
                };
                ModelInfo {
                    name: format!("{}-{}", config.name, self.variant),
                    precision: self.variant.clone(),
                    size_bytes,
                    input_shape: shape(variant.and_then(|v| v.input_shape), (1, 3, h, w)),
                    output_shape: shape(variant.and_then(|v| v.output_shape), (1, 1, h, w)),
                }
            },
        })
    }

    /// Preprocessing parameters for the loaded model
    ///
    /// # Errors
    /// - Normalization arrays shorter than three entries
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        match &self.format {
            ModelFormat::HuggingFace { preprocessor, .. } => Ok(PreprocessingConfig {
                target_size: [preprocessor.size.height, preprocessor.size.width],
                normalization_mean: rgb_triplet(&preprocessor.image_mean, "image_mean")?
                    .map(|v| (v / 255.0) as f32),
                normalization_std: rgb_triplet(&preprocessor.image_std, "image_std")?
                    .map(|v| (v / 255.0) as f32),
            }),
            ModelFormat::Legacy(config) => {
                let norm = &config.preprocessing.normalization;
                Ok(PreprocessingConfig {
                    target_size: config.preprocessing.target_size,
                    normalization_mean: rgb_triplet(&norm.mean, "mean")?,
                    normalization_std: rgb_triplet(&norm.std, "std")?,
                })
            },
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let content = fs::read_to_string(path)
        .map_err(|e| BgRemovalError::invalid_config(format!("Failed to read {name}: {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| BgRemovalError::invalid_config(format!("Failed to parse {name}: {e}")))
}

fn rgb_triplet<T: Copy>(values: &[T], key: &str) -> Result<[T; 3]> {
    match values {
        [r, g, b, ..] => Ok([*r, *g, *b]),
        _ => Err(BgRemovalError::invalid_config(format!(
            "{key} must have at least 3 values"
        ))),
    }
}

fn scan_onnx_variants(onnx_dir: &Path) -> Result<Vec<String>> {
    if !onnx_dir.is_dir() {
        return Err(BgRemovalError::invalid_config(format!(
            "onnx directory not found in HuggingFace model: {}",
            onnx_dir.display()
        )));
    }

    let mut available = Vec::new();
    for entry in fs::read_dir(onnx_dir)?.flatten() {
        match entry.file_name().to_str() {
            Some("model.onnx") => available.push("fp32".to_string()),
            Some("model_fp16.onnx") => available.push("fp16".to_string()),
            _ => {},
        }
    }
    available.sort();

    if available.is_empty() {
        return Err(BgRemovalError::invalid_config(format!(
            "No ONNX model files found in: {}",
            onnx_dir.display()
        )));
    }
    Ok(available)
}

/// Pick a variant from `available`
///
/// An explicit request must match exactly. Otherwise `CoreML` prefers fp32,
/// CPU and CUDA prefer fp16, auto follows `CoreML` on macOS and CPU elsewhere.
/// Fallback order is fp16, fp32, then whatever comes first.
pub(crate) fn resolve_variant(
    available: &[String],
    requested: Option<&str>,
    execution_provider: Option<&ExecutionProvider>,
) -> std::result::Result<String, String> {
    let has = |v: &str| available.iter().any(|a| a == v);

    if let Some(variant) = requested {
        return if has(variant) {
            Ok(variant.to_string())
        } else {
            Err(format!(
                "variant '{variant}' not found. Available: {available:?}"
            ))
        };
    }

    let preferred = match execution_provider {
        Some(ExecutionProvider::CoreMl) => Some("fp32"),
        Some(ExecutionProvider::Cpu | ExecutionProvider::Cuda) => Some("fp16"),
        Some(ExecutionProvider::Auto) if cfg!(target_os = "macos") => Some("fp32"),
        Some(ExecutionProvider::Auto) => Some("fp16"),
        None => None,
    };

    preferred
        .into_iter()
        .chain(["fp16", "fp32"])
        .find(|v| has(v))
        .map(str::to_string)
        .or_else(|| available.first().cloned())
        .ok_or_else(|| "no variants available".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_explicit_variant_must_exist() {
        let available = variants(&["fp32"]);
        assert_eq!(resolve_variant(&available, Some("fp32"), None).unwrap(), "fp32");
        let err = resolve_variant(&available, Some("fp16"), None).unwrap_err();
        assert!(err.contains("fp16"));
    }

    #[test]
    fn test_provider_preferences() {
        let both = variants(&["fp16", "fp32"]);
        assert_eq!(
            resolve_variant(&both, None, Some(&ExecutionProvider::CoreMl)).unwrap(),
            "fp32"
        );
        assert_eq!(
            resolve_variant(&both, None, Some(&ExecutionProvider::Cpu)).unwrap(),
            "fp16"
        );
        assert_eq!(
            resolve_variant(&both, None, Some(&ExecutionProvider::Cuda)).unwrap(),
            "fp16"
        );
    }

    #[test]
    fn test_fallback_order() {
        assert_eq!(resolve_variant(&variants(&["fp32"]), None, Some(&ExecutionProvider::Cpu)).unwrap(), "fp32");
        assert_eq!(resolve_variant(&variants(&["fp16", "fp32"]), None, None).unwrap(), "fp16");
        assert_eq!(resolve_variant(&variants(&["int8"]), None, None).unwrap(), "int8");
        assert!(resolve_variant(&[], None, None).is_err());
    }

    #[test]
    fn test_rgb_triplet() {
        assert_eq!(rgb_triplet(&[1, 2, 3, 4], "mean").unwrap(), [1, 2, 3]);
        assert!(rgb_triplet(&[1, 2], "mean").is_err());
    }

    #[test]
    fn test_display_name() {
        let spec = ModelSpec {
            path: PathBuf::from("/models/isnet-general-onnx"),
            variant: None,
        };
        assert_eq!(spec.display_name(), "external:isnet-general-onnx");
    }
}
