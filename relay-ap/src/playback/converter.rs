//! Sample converter worker
//!
//! Drains the ingest queue, decodes each chunk into a pooled sample buffer
//! and forwards the frame to the playback driver. The forward awaits while
//! the frame queue is full: once audio is decoded it is never dropped, so a
//! lagging driver stalls the converter, which in turn fills the ingest queue
//! and makes the gate reject new chunks.
//!
//! Shutdown closes the ingest queue without discarding what is already in
//! it; the worker exits after the last buffered chunk has been forwarded,
//! and dropping its sender closes the frame queue.

use super::buffer_pool::BufferPool;
use super::stats::PipelineStats;
use crate::audio::convert::decode_le_i16;
use crate::audio::types::{RawChunk, SampleFrame};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Long-running converter between the ingest and frame queues
pub struct SampleConverter {
    chunks: mpsc::Receiver<RawChunk>,
    frames: mpsc::Sender<SampleFrame>,
    pool: Arc<BufferPool>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
}

impl SampleConverter {
    pub fn new(
        chunks: mpsc::Receiver<RawChunk>,
        frames: mpsc::Sender<SampleFrame>,
        pool: Arc<BufferPool>,
        stats: Arc<PipelineStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chunks,
            frames,
            pool,
            stats,
            shutdown,
        }
    }

    /// Decode one chunk into a frame backed by a pooled buffer
    pub fn convert(&self, chunk: RawChunk) -> SampleFrame {
        let mut buffer = self.pool.get();
        let samples = decode_le_i16(&chunk.payload, &mut buffer);
        trace!("Converted {} bytes into {} samples", chunk.payload.len(), samples);
        SampleFrame::new(chunk.format, buffer)
    }

    /// Run until the ingest queue is closed and drained
    ///
    /// Fails if the playback driver goes away while frames are still being
    /// produced; the shutdown token is cancelled in that case so the rest of
    /// the pipeline winds down too.
    pub async fn run(mut self) -> Result<()> {
        let mut closing = false;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.shutdown.cancelled(), if !closing => {
                    debug!("Shutdown requested, draining ingest queue");
                    self.chunks.close();
                    closing = true;
                    continue;
                }
                chunk = self.chunks.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };

            let frame = self.convert(chunk);
            if self.frames.send(frame).await.is_err() {
                warn!("Playback driver stopped, abandoning conversion");
                self.shutdown.cancel();
                return Err(Error::Playback(
                    "Playback driver stopped while frames were pending".to_string(),
                ));
            }
            PipelineStats::incr(&self.stats.frames_converted);
        }

        info!("Sample converter finished, closing frame queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::AudioFormat;

    struct Harness {
        chunk_tx: mpsc::Sender<RawChunk>,
        frame_rx: mpsc::Receiver<SampleFrame>,
        pool: Arc<BufferPool>,
        shutdown: CancellationToken,
        converter: SampleConverter,
    }

    fn harness(pool_size: usize) -> Harness {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let pool = Arc::new(BufferPool::new(pool_size, 2048));
        let shutdown = CancellationToken::new();
        let converter = SampleConverter::new(
            chunk_rx,
            frame_tx,
            Arc::clone(&pool),
            Arc::new(PipelineStats::new()),
            shutdown.clone(),
        );
        Harness {
            chunk_tx,
            frame_rx,
            pool,
            shutdown,
            converter,
        }
    }

    fn chunk(bytes: &[u8]) -> RawChunk {
        RawChunk::new(AudioFormat::output(), bytes.to_vec())
    }

    #[test]
    fn test_convert_decodes_and_keeps_format() {
        let h = harness(4);
        let raw = RawChunk::new(AudioFormat::new(1, 22050), vec![0x01, 0x00, 0xFF, 0xFF]);
        let frame = h.converter.convert(raw);
        assert_eq!(frame.samples(), &[1, -1]);
        assert_eq!(frame.format, AudioFormat::new(1, 22050));
    }

    #[test]
    fn test_convert_prefers_pooled_buffer() {
        let h = harness(4);
        let mut stale = Vec::with_capacity(2048);
        stale.extend_from_slice(&[7; 2048]);
        let ptr = stale.as_ptr();
        h.pool.put(stale);

        let frame = h.converter.convert(chunk(&[5, 0, 6, 0]));
        assert_eq!(frame.samples(), &[5, 6], "no stale samples past decoded length");
        assert_eq!(frame.into_samples().as_ptr(), ptr);
        assert_eq!(h.pool.stats().reuses, 1);
        assert_eq!(h.pool.stats().allocations, 0);
    }

    #[tokio::test]
    async fn test_forwards_in_order_and_closes_frame_queue() {
        let Harness {
            chunk_tx,
            mut frame_rx,
            converter,
            ..
        } = harness(4);

        let task = tokio::spawn(converter.run());
        for i in 0..5u8 {
            chunk_tx.send(chunk(&[i, 0])).await.unwrap();
        }
        drop(chunk_tx);

        for i in 0..5i16 {
            let frame = frame_rx.recv().await.unwrap();
            assert_eq!(frame.samples(), &[i]);
        }
        assert!(frame_rx.recv().await.is_none(), "frame queue closed after drain");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_chunks() {
        let Harness {
            chunk_tx,
            mut frame_rx,
            shutdown,
            converter,
            ..
        } = harness(4);

        for i in 0..3u8 {
            chunk_tx.send(chunk(&[i, 0])).await.unwrap();
        }
        shutdown.cancel();
        let task = tokio::spawn(converter.run());

        let mut received = Vec::new();
        while let Some(frame) = frame_rx.recv().await {
            received.push(frame.samples()[0]);
        }
        assert_eq!(received, vec![0, 1, 2]);
        task.await.unwrap().unwrap();

        // Queue is closed for new chunks even though a sender is still alive
        assert!(chunk_tx.send(chunk(&[9, 0])).await.is_err());
    }

    #[tokio::test]
    async fn test_driver_gone_is_error() {
        let Harness {
            chunk_tx,
            frame_rx,
            shutdown,
            converter,
            ..
        } = harness(4);
        drop(frame_rx);

        chunk_tx.send(chunk(&[1, 0])).await.unwrap();
        let result = converter.run().await;
        assert!(matches!(result, Err(Error::Playback(_))));
        assert!(shutdown.is_cancelled());
    }
}
