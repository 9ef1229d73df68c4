//! Audio data types, PCM conversion and hardware output

pub mod convert;
pub mod output;
pub mod types;

pub use convert::decode_le_i16;
pub use output::{AudioSink, CpalSink, OutputSettings};
pub use types::{
    AudioFormat, RawChunk, SampleFrame, BYTES_PER_SAMPLE, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE,
    PERIOD_BYTES, PERIOD_SAMPLES,
};
