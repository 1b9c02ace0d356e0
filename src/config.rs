//! Configuration types for the removal pipeline and the HTTP server

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use crate::processor::BackendType;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default listening port
pub const DEFAULT_PORT: u16 = 5001;

/// Default upper bound for an uploaded request body (32 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Configuration handed to inference backends on initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Enable debug mode (additional logging and validation)
    pub debug: bool,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Model specification including folder and variant
    pub model_spec: ModelSpec,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            debug: false,
            intra_threads: 0,
            inter_threads: 0,
            model_spec: ModelSpec::default(),
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use imgly_bgremove_server::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .intra_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 4);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    /// - Thread counts above 1024
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("intra threads", self.intra_threads),
            ("inter threads", self.inter_threads),
        ] {
            if value > 1024 {
                return Err(BgRemovalError::config_value_error(
                    name,
                    value,
                    "0-1024",
                    Some(0),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
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

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Log output format selectable from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Compact human readable console output
    #[default]
    Console,
    /// JSON lines (requires the `tracing-json` feature)
    Json,
}

/// Command line and environment arguments for the server binary
#[derive(Debug, Clone, Parser)]
#[command(name = "imgly-bgremove-server", version, about = "Background removal HTTP service")]
pub struct ServerArgs {
    /// IPv4 or IPv6 address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Model folder (`HuggingFace` or legacy `model.json` layout)
    #[arg(short, long, env = "MODEL_PATH")]
    pub model: PathBuf,

    /// Model variant (fp16, fp32); resolved from the execution provider when omitted
    #[arg(long, env = "MODEL_VARIANT")]
    pub variant: Option<String>,

    /// Inference backend
    #[arg(short, long, env = "BACKEND", value_enum)]
    pub backend: Option<BackendType>,

    /// Execution provider for the ONNX backend
    #[arg(long, env = "EXECUTION_PROVIDER", value_enum, default_value_t = ExecutionProvider::Auto)]
    pub execution_provider: ExecutionProvider,

    /// Intra-op thread count (0 = auto)
    #[arg(long, env = "INTRA_THREADS", default_value_t = 0)]
    pub intra_threads: usize,

    /// Inter-op thread count (0 = auto)
    #[arg(long, env = "INTER_THREADS", default_value_t = 0)]
    pub inter_threads: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace); per-request stage logs are debug
    /// level and hidden at the default info level unless `-v` or `RUST_LOG` is set
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub backend: BackendType,
    pub removal: RemovalConfig,
}

impl ServerConfig {
    /// Resolve arguments into a validated configuration
    ///
    /// # Errors
    /// - `max_upload_bytes` of zero
    /// - Invalid thread counts
    pub fn from_args(args: &ServerArgs) -> Result<Self> {
        let removal = RemovalConfig::builder()
            .execution_provider(args.execution_provider)
            .intra_threads(args.intra_threads)
            .inter_threads(args.inter_threads)
            .debug(args.verbose > 0)
            .model_spec(ModelSpec {
                path: args.model.clone(),
                variant: args.variant.clone(),
            })
            .build()?;

        let config = Self {
            host: args.host.clone(),
            port: args.port,
            max_upload_bytes: args.max_upload_bytes,
            backend: args.backend.unwrap_or_default(),
            removal,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate server-level settings
    ///
    /// # Errors
    /// - `max_upload_bytes` of zero
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max upload bytes",
                self.max_upload_bytes,
                "1..",
                Some(DEFAULT_MAX_UPLOAD_BYTES),
            ));
        }
        self.removal.validate()
    }

    /// Socket address to bind
    ///
    /// # Errors
    /// - Host that is not an IPv4 or IPv6 address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.trim_matches(|c| c == '[' || c == ']').parse().map_err(|e| {
            BgRemovalError::invalid_config(format!("Invalid bind host '{}': {e}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
