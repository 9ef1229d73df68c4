//! Pipeline counters
//!
//! Written with relaxed atomics from every stage; read as a snapshot for
//! logging and tests.

use super::buffer_pool::PoolStats;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) chunks_admitted: AtomicU64,
    pub(crate) bytes_admitted: AtomicU64,
    pub(crate) rejected_full: AtomicU64,
    pub(crate) rejected_empty: AtomicU64,
    pub(crate) rejected_odd: AtomicU64,
    pub(crate) rejected_closed: AtomicU64,
    pub(crate) frames_converted: AtomicU64,
    pub(crate) frames_played: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, pool: PoolStats) -> StatsSnapshot {
        StatsSnapshot {
            chunks_admitted: self.chunks_admitted.load(Ordering::Relaxed),
            bytes_admitted: self.bytes_admitted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_empty: self.rejected_empty.load(Ordering::Relaxed),
            rejected_odd: self.rejected_odd.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            frames_converted: self.frames_converted.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            pool,
        }
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Chunks accepted by the ingest gate
    pub chunks_admitted: u64,
    /// Bytes accepted by the ingest gate
    pub bytes_admitted: u64,
    /// Chunks rejected because the ingest queue was full
    pub rejected_full: u64,
    /// Empty payloads (no-ops)
    pub rejected_empty: u64,
    /// Odd-length payloads
    pub rejected_odd: u64,
    /// Chunks offered after shutdown
    pub rejected_closed: u64,
    /// Frames produced by the converter
    pub frames_converted: u64,
    /// Frames written to the device
    pub frames_played: u64,
    pub pool: PoolStats,
}
