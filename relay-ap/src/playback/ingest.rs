//! Ingest gate: admission of producer byte buffers
//!
//! The producer calls [`AudioConsumer::admit`] from its own thread whenever it
//! has decoded audio. Admission never blocks: a chunk either gets a slot in
//! the bounded ingest queue or is rejected whole. The returned byte count is
//! the only backpressure signal the producer gets; 0 means "retry later or
//! drop upstream".

use super::stats::PipelineStats;
use crate::audio::types::{AudioFormat, RawChunk, BYTES_PER_SAMPLE};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

/// Capability handed to audio producers
pub trait AudioConsumer: Send + Sync {
    /// Offer interleaved 16-bit little-endian PCM.
    ///
    /// Returns the number of bytes accepted: either all of `bytes` or 0.
    fn admit(&self, format: &AudioFormat, bytes: &[u8]) -> usize;
}

/// Producer-facing end of the ingest queue
#[derive(Clone)]
pub struct IngestGate {
    tx: mpsc::Sender<RawChunk>,
    stats: Arc<PipelineStats>,
}

impl IngestGate {
    /// Create a gate and the receiving end of its queue
    ///
    /// # Arguments
    /// * `capacity` - Chunks in flight before admission starts rejecting
    /// * `stats` - Shared pipeline counters
    pub fn channel(capacity: usize, stats: Arc<PipelineStats>) -> (Self, mpsc::Receiver<RawChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, stats }, rx)
    }

    /// Chunks currently waiting for the converter
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Maximum chunks in flight
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// True once the converter has stopped accepting chunks
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl AudioConsumer for IngestGate {
    fn admit(&self, format: &AudioFormat, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            trace!("Empty payload ignored");
            PipelineStats::incr(&self.stats.rejected_empty);
            return 0;
        }

        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            let count = PipelineStats::incr(&self.stats.rejected_odd);
            warn!(
                "Rejected payload of odd length {} (not whole 16-bit samples, total: {})",
                bytes.len(),
                count
            );
            return 0;
        }

        // Reserve first so the payload is only copied when it will be kept
        match self.tx.try_reserve() {
            Ok(permit) => {
                permit.send(RawChunk::new(*format, bytes.to_vec()));
                PipelineStats::incr(&self.stats.chunks_admitted);
                self.stats
                    .bytes_admitted
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                trace!("Admitted {} bytes ({} samples)", bytes.len(), bytes.len() / BYTES_PER_SAMPLE);
                bytes.len()
            }
            Err(TrySendError::Full(())) => {
                let count = PipelineStats::incr(&self.stats.rejected_full);
                debug!("Ingest buffer full, rejected {} bytes (total: {})", bytes.len(), count);
                0
            }
            Err(TrySendError::Closed(())) => {
                let count = PipelineStats::incr(&self.stats.rejected_closed);
                if count == 1 {
                    debug!("Ingest queue closed, rejecting further audio");
                }
                0
            }
        }
    }
}
