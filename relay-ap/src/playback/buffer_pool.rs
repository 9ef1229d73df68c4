//! Reusable sample buffer pool
//!
//! Bounded free list shared by the converter (takes buffers) and the playback
//! driver (returns them). Every operation is non-blocking with a fallback:
//! an empty pool means a fresh allocation, a full pool means the returned
//! buffer is dropped. Buffers move by value, so a buffer is never held by two
//! owners at once.

use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Bounded pool of sample buffers with a fixed per-buffer capacity
pub struct BufferPool {
    free: ArrayQueue<Vec<i16>>,
    buffer_capacity: usize,
    allocations: AtomicU64,
    reuses: AtomicU64,
    returns: AtomicU64,
    drops: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool
    ///
    /// # Arguments
    /// * `pool_size` - Maximum idle buffers kept (must be non-zero)
    /// * `buffer_capacity` - Capacity of each buffer in samples
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(pool_size),
            buffer_capacity,
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    /// Take an idle buffer, or allocate one if the pool is empty
    pub fn get(&self) -> Vec<i16> {
        match self.free.pop() {
            Some(buffer) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                let total = self.allocations.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("Buffer pool empty, allocating buffer #{}", total);
                Vec::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Return a buffer; dropped if the pool is already full
    ///
    /// Returns true if the buffer was kept for reuse.
    pub fn put(&self, mut buffer: Vec<i16>) -> bool {
        buffer.clear();
        match self.free.push(buffer) {
            Ok(()) => {
                self.returns.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Idle buffers currently held
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Maximum idle buffers
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("buffer_capacity", &self.buffer_capacity)
            .field("idle", &self.idle())
            .finish()
    }
}

/// Buffer pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers allocated because the pool was empty
    pub allocations: u64,
    /// Buffers handed out from the pool
    pub reuses: u64,
    /// Buffers accepted back into the pool
    pub returns: u64,
    /// Buffers dropped because the pool was full
    pub drops: u64,
    /// Idle buffers at snapshot time
    pub idle: usize,
}
