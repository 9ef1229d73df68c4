//! Streaming session interface
//!
//! The pipeline does not care where audio comes from. A session logs in,
//! resolves a URI to a playable track and, once playing, pushes PCM into the
//! [`AudioConsumer`] it was given from its own thread.

pub mod pcm_file;

use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use crate::playback::AudioConsumer;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use pcm_file::PcmFileSession;

/// Account credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A track ready to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub uri: String,
    pub format: AudioFormat,
    /// Length of the audio payload in bytes, when known
    pub byte_len: Option<u64>,
}

/// Login, track resolution and playback control
pub trait Session {
    /// Authenticate; failure is fatal to startup
    fn login(&mut self, credentials: &Credentials) -> Result<()>;

    /// Resolve `uri` and make it the current track
    fn load(&mut self, uri: &str) -> Result<TrackInfo>;

    /// Start delivering the current track into `consumer`
    ///
    /// Returns once delivery has started. `done` is cancelled by the session
    /// when the track has been fully delivered; cancelling it from outside
    /// asks the session to stop delivering.
    fn play(&mut self, consumer: Arc<dyn AudioConsumer>, done: CancellationToken) -> Result<()>;
}

/// Read the application key file
pub fn read_application_key(path: &Path) -> Result<Vec<u8>> {
    let key = std::fs::read(path).map_err(|e| {
        Error::Session(format!("Failed to read application key {}: {}", path.display(), e))
    })?;
    if key.is_empty() {
        return Err(Error::Session(format!(
            "Application key {} is empty",
            path.display()
        )));
    }
    Ok(key)
}
