//! Bootstrap configuration loading and config file resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (applied by the binary on top of this file)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing config file is never fatal: the loader warns and falls back to
//! defaults. A file that exists but fails to parse is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

/// Directory name used under the platform config dir
const CONFIG_DIR_NAME: &str = "pcm-relay";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the streaming-service application key
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Account username (password is never read from the file)
    #[serde(default)]
    pub username: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Queue and pool sizing (optional)
    #[serde(default)]
    pub pipeline: PipelineToml,

    /// Output device selection (optional)
    #[serde(default)]
    pub output: OutputToml,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Queue and pool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineToml {
    /// Raw chunks in flight between producer and converter
    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,

    /// Decoded frames in flight between converter and playback driver
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Idle sample buffers kept for reuse
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

/// Output device selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputToml {
    /// Device name (None = system default device)
    #[serde(default)]
    pub device: Option<String>,

    /// Device buffer size in frames (None = one period)
    #[serde(default)]
    pub buffer_frames: Option<u32>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ingest_capacity() -> usize {
    8
}

fn default_frame_queue_capacity() -> usize {
    8
}

fn default_pool_capacity() -> usize {
    12
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PipelineToml {
    fn default() -> Self {
        Self {
            ingest_capacity: default_ingest_capacity(),
            frame_queue_capacity: default_frame_queue_capacity(),
            pool_capacity: default_pool_capacity(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            key_path: None,
            username: None,
            logging: LoggingConfig::default(),
            pipeline: PipelineToml::default(),
            output: OutputToml::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file from disk and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load the config file, falling back to defaults
    ///
    /// An explicitly named file (CLI or environment) that does not exist is
    /// an error; a missing default file is not.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            ConfigSource::Explicit(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                info!("Using configuration file {}", path.display());
                Self::load(&path)
            }
            ConfigSource::Default(path) if path.exists() => {
                info!("Using configuration file {}", path.display());
                Self::load(&path)
            }
            ConfigSource::Default(path) => {
                warn!(
                    "No configuration file at {}, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            ConfigSource::None => {
                warn!("Could not determine config directory, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject sizes the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.ingest_capacity == 0 {
            return Err(Error::InvalidInput(
                "pipeline.ingest_capacity must be at least 1".to_string(),
            ));
        }
        if pipeline.frame_queue_capacity == 0 {
            return Err(Error::InvalidInput(
                "pipeline.frame_queue_capacity must be at least 1".to_string(),
            ));
        }
        if pipeline.pool_capacity == 0 {
            return Err(Error::InvalidInput(
                "pipeline.pool_capacity must be at least 1".to_string(),
            ));
        }
        if self.output.buffer_frames == Some(0) {
            return Err(Error::InvalidInput(
                "output.buffer_frames must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the config file path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or through the environment
    Explicit(PathBuf),
    /// Platform default location
    Default(PathBuf),
    /// No location could be determined
    None,
}

/// Config file resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config dir>/pcm-relay/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    match dirs::config_dir() {
        Some(dir) => ConfigSource::Default(dir.join(CONFIG_DIR_NAME).join("config.toml")),
        None => ConfigSource::None,
    }
}
