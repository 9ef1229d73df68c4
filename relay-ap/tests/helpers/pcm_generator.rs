//! Deterministic PCM test data

use relay_ap::audio::types::AudioFormat;
use relay_ap::playback::AudioConsumer;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// One chunk of `samples` little-endian samples, every sample equal to `index`
///
/// Lets a test tell chunks apart after they come out of the pipeline.
pub fn numbered_chunk(index: i16, samples: usize) -> Vec<u8> {
    index.to_le_bytes().repeat(samples)
}

/// Write `chunks` numbered chunks of `samples` samples each to `path`
pub fn write_pcm_file(path: &Path, chunks: usize, samples: usize) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for i in 0..chunks {
        file.write_all(&numbered_chunk(i as i16, samples))?;
    }
    file.flush()
}

/// Offer `bytes` until the consumer takes them or `timeout` passes
///
/// Returns the accepted byte count (0 on timeout).
pub async fn admit_with_retry(
    consumer: &dyn AudioConsumer,
    bytes: &[u8],
    timeout: Duration,
) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let accepted = consumer.admit(&AudioFormat::output(), bytes);
        if accepted > 0 || Instant::now() >= deadline {
            return accepted;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
