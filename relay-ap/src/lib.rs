//! relay-ap library
//!
//! Takes interleaved 16-bit PCM pushed by a streaming session and plays it
//! on the default audio device in fixed-size periods. Producer, converter and
//! device each run on their own thread of control, joined by bounded queues.
//!
//! Exposed as a library so integration tests can drive the pipeline with a
//! recording sink in place of real hardware.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;

pub use error::{Error, Result};
