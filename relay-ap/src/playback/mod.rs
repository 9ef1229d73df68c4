//! Byte-to-sample playback pipeline
//!
//! Leaves first: buffer pool, sample converter, ingest gate, playback
//! driver, and the wiring that starts them together.

pub mod buffer_pool;
pub mod converter;
pub mod driver;
pub mod ingest;
pub mod pipeline;
pub mod stats;

pub use buffer_pool::{BufferPool, PoolStats};
pub use converter::SampleConverter;
pub use driver::{check_frame_length, ActiveStream, FrameLengthViolation, PlaybackDriver};
pub use ingest::{AudioConsumer, IngestGate};
pub use pipeline::{Pipeline, PipelineConfig};
pub use stats::{PipelineStats, StatsSnapshot};
