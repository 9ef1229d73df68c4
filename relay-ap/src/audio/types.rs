//! Core audio data types
//!
//! Defines the format descriptor and the two buffer kinds that travel through
//! the pipeline: raw byte chunks from the producer and decoded sample frames
//! for the playback driver.

use serde::Serialize;

/// Output channel count the playback device is opened with
pub const OUTPUT_CHANNELS: u16 = 2;

/// Output sample rate the playback device is opened with
pub const OUTPUT_SAMPLE_RATE: u32 = 44100;

/// Samples per playback period, channel-interleaved (1024 stereo frames)
pub const PERIOD_SAMPLES: usize = 2048;

/// Bytes per sample (signed 16-bit little-endian)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes a producer must deliver for one full period
pub const PERIOD_BYTES: usize = PERIOD_SAMPLES * BYTES_PER_SAMPLE;

/// Format descriptor attached to every chunk and frame
///
/// Samples are always interleaved signed 16-bit little-endian; only the
/// channel count and rate vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Format the playback device is opened with
    pub const fn output() -> Self {
        Self::new(OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE)
    }

    /// Duration of `samples` interleaved samples in milliseconds
    pub fn duration_ms(&self, samples: usize) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        let frames = samples as f64 / self.channels as f64;
        frames * 1000.0 / self.sample_rate as f64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::output()
    }
}

/// Raw interleaved PCM bytes as delivered by the producer
///
/// Owned by the ingest queue once admitted; consumed by conversion.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub format: AudioFormat,
    pub payload: Vec<u8>,
}

impl RawChunk {
    pub fn new(format: AudioFormat, payload: Vec<u8>) -> Self {
        Self { format, payload }
    }
}

/// Decoded samples for one playback period
///
/// The sample buffer is a pooled allocation; `into_samples` hands it back so
/// the driver can return it to the pool after the device write.
#[derive(Debug)]
pub struct SampleFrame {
    pub format: AudioFormat,
    samples: Vec<i16>,
}

impl SampleFrame {
    pub fn new(format: AudioFormat, samples: Vec<i16>) -> Self {
        Self { format, samples }
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Logical length in samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Give up the frame, keeping its buffer
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}
