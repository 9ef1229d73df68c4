//! Test helper modules for relay-ap integration tests
//!
//! - RecordingSink: stands in for the audio device and records every write
//! - pcm_generator: deterministic PCM payloads and files

#![allow(dead_code)]

pub mod pcm_generator;
pub mod recording_sink;

pub use pcm_generator::{admit_with_retry, numbered_chunk, write_pcm_file};
pub use recording_sink::{RecordingSink, SinkLog};
