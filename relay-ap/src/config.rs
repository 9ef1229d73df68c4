//! Runtime configuration for relay-ap
//!
//! Merges command-line overrides onto the bootstrap TOML file. Everything is
//! resolved once at startup; nothing here changes while audio is playing.

use crate::audio::output::OutputSettings;
use crate::error::{Error, Result};
use crate::playback::PipelineConfig;
use crate::session::Credentials;
use relay_common::config::TomlConfig;
use std::path::PathBuf;

/// Values given on the command line (or their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub key_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub uri: Option<String>,
    pub device: Option<String>,
    pub debug: bool,
}

/// Fully resolved player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Application key file (None = run without one)
    ///
    /// Optional because the local file session needs no key. A streaming
    /// service session has to treat a missing key as a startup failure.
    pub key_path: Option<PathBuf>,
    pub credentials: Credentials,
    /// Track to play
    pub uri: String,
    pub log_level: String,
    pub pipeline: PipelineConfig,
    pub output: OutputSettings,
}

impl PlayerConfig {
    /// Build the player configuration
    ///
    /// CLI values win over the file. A username and a track URI are
    /// required; the password may be empty.
    pub fn resolve(file: &TomlConfig, cli: CliOverrides) -> Result<Self> {
        let username = cli
            .username
            .or_else(|| file.username.clone())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::Config("a username is required (--username or RELAY_USERNAME)".to_string()))?;

        let uri = cli
            .uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| Error::Config("a track URI is required".to_string()))?;

        let log_level = resolve_log_level(file, cli.debug)?;

        let pipeline = PipelineConfig {
            ingest_capacity: file.pipeline.ingest_capacity,
            frame_queue_capacity: file.pipeline.frame_queue_capacity,
            pool_capacity: file.pipeline.pool_capacity,
            ..PipelineConfig::default()
        };

        let output = OutputSettings {
            device: cli.device.or_else(|| file.output.device.clone()),
            format: pipeline.format,
            period_samples: pipeline.period_samples,
            buffer_frames: file.output.buffer_frames,
        };

        let config = Self {
            key_path: cli.key_path.or_else(|| file.key_path.clone()),
            credentials: Credentials {
                username,
                password: cli.password.unwrap_or_default(),
            },
            uri,
            log_level,
            pipeline,
            output,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that came from outside the TOML validator
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.period_samples % self.pipeline.format.channels as usize != 0 {
            return Err(Error::Config(format!(
                "period of {} samples does not hold whole {}-channel frames",
                self.pipeline.period_samples, self.pipeline.format.channels
            )));
        }
        Ok(())
    }
}

/// Log level: `debug` with `--debug`, else the file's `[logging] level`
///
/// Needed before tracing is initialised, so the binary calls this ahead of
/// [`PlayerConfig::resolve`], which uses it too.
pub fn resolve_log_level(file: &TomlConfig, debug: bool) -> Result<String> {
    if debug {
        return Ok("debug".to_string());
    }
    let level = file.logging.level.to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(level),
        _ => Err(Error::Config(format!(
            "unknown log level '{}'",
            file.logging.level
        ))),
    }
}

/// Default tracing filter for a log level
pub fn default_log_filter(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    format!("relay_ap={},relay_common={}", level, level)
}
