//! Error types for relay-ap
//!
//! Only fatal or startup conditions are errors. Full queues, empty payloads
//! and pool exhaustion are handled where they occur and never show up here.

use crate::playback::driver::FrameLengthViolation;
use thiserror::Error;

/// Main error type for relay-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio output device errors (open, start, write, stop)
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// A frame of unexpected length reached the playback driver
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] FrameLengthViolation),

    /// Session errors (application key, login, URI resolution, track load)
    #[error("Session error: {0}")]
    Session(String),

    /// Pipeline wiring errors (a stage went away unexpectedly)
    #[error("Playback error: {0}")]
    Playback(String),

    /// A pipeline worker panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library (bootstrap config)
    #[error(transparent)]
    Common(#[from] relay_common::Error),
}

/// Convenience Result type using relay-ap Error
pub type Result<T> = std::result::Result<T, Error>;
