//! Pipeline wiring
//!
//! ```text
//! producer ──admit──▶ IngestGate ──queue A──▶ SampleConverter ──queue B──▶ PlaybackDriver ──▶ device
//!                                                  ▲                            │
//!                                                  └────────── BufferPool ◀─────┘
//! ```
//!
//! The converter runs as a tokio task, the driver on its own OS thread. One
//! cancellation token is shared by everything: `shutdown()` cancels it for a
//! graceful drain, and either worker cancels it when it fails or panics so
//! callers waiting on [`Pipeline::stopping`] wake up.

use super::buffer_pool::BufferPool;
use super::converter::SampleConverter;
use super::driver::{ActiveStream, PlaybackDriver};
use super::ingest::{AudioConsumer, IngestGate};
use super::stats::{PipelineStats, StatsSnapshot};
use crate::audio::output::AudioSink;
use crate::audio::types::{AudioFormat, PERIOD_SAMPLES};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Queue sizes and the fixed output format
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw chunks in flight between producer and converter
    pub ingest_capacity: usize,
    /// Frames in flight between converter and driver
    pub frame_queue_capacity: usize,
    /// Idle buffers kept for reuse
    pub pool_capacity: usize,
    /// Exact frame length the device accepts, channel-interleaved
    pub period_samples: usize,
    /// Format the device is opened with
    pub format: AudioFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 8,
            frame_queue_capacity: 8,
            pool_capacity: 12,
            period_samples: PERIOD_SAMPLES,
            format: AudioFormat::output(),
        }
    }
}

/// A running pipeline
pub struct Pipeline {
    gate: IngestGate,
    shutdown: CancellationToken,
    converter: JoinHandle<Result<()>>,
    driver: oneshot::Receiver<Result<()>>,
    pool: Arc<BufferPool>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Open the device and start both workers
    ///
    /// `open_sink` runs on the driver thread, so the sink does not need to be
    /// `Send`. Returns once the device is open and its stream started; a
    /// failure to open or start is returned here and nothing keeps running.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start<S, F>(config: &PipelineConfig, open_sink: F) -> Result<Self>
    where
        S: AudioSink + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let stats = Arc::new(PipelineStats::new());
        let pool = Arc::new(BufferPool::new(config.pool_capacity, config.period_samples));
        let shutdown = CancellationToken::new();

        let (gate, chunk_rx) = IngestGate::channel(config.ingest_capacity, Arc::clone(&stats));
        let (frame_tx, frame_rx) = mpsc::channel(config.frame_queue_capacity);

        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (done_tx, done_rx) = oneshot::channel::<Result<()>>();

        let driver_pool = Arc::clone(&pool);
        let driver_stats = Arc::clone(&stats);
        let driver_shutdown = shutdown.clone();
        let format = config.format;
        let period_samples = config.period_samples;

        std::thread::Builder::new()
            .name("playback-driver".to_string())
            .spawn(move || {
                let stream = match open_sink().and_then(ActiveStream::start) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Cancels the shared token if the driver unwinds
                let fatal_guard = driver_shutdown.drop_guard();

                let driver = PlaybackDriver::new(stream, format, period_samples, driver_pool, driver_stats);
                let result = driver.run(frame_rx);
                match &result {
                    Ok(()) => {
                        let _ = fatal_guard.disarm();
                    }
                    Err(e) => {
                        error!("Playback driver failed: {}", e);
                        drop(fatal_guard);
                    }
                }
                let _ = done_tx.send(result);
            })?;

        ready_rx
            .await
            .map_err(|_| Error::WorkerPanicked("playback driver panicked while opening device".to_string()))??;

        info!(
            "Audio output started: {} channels, {} Hz, {} samples per period",
            config.format.channels, config.format.sample_rate, config.period_samples
        );

        let converter = SampleConverter::new(
            chunk_rx,
            frame_tx,
            Arc::clone(&pool),
            Arc::clone(&stats),
            shutdown.clone(),
        );
        let converter_guard = shutdown.clone().drop_guard();
        let converter = tokio::spawn(async move {
            let result = converter.run().await;
            if result.is_ok() {
                let _ = converter_guard.disarm();
            }
            result
        });

        Ok(Self {
            gate,
            shutdown,
            converter,
            driver: done_rx,
            pool,
            stats,
        })
    }

    /// Producer capability for this pipeline
    pub fn consumer(&self) -> Arc<dyn AudioConsumer> {
        Arc::new(self.gate.clone())
    }

    /// The ingest gate itself (for queue depth inspection)
    pub fn gate(&self) -> &IngestGate {
        &self.gate
    }

    /// Stop admitting audio and drain what has already been admitted
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once shutdown was requested or a worker failed
    pub async fn stopping(&self) {
        self.shutdown.cancelled().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.pool.stats())
    }

    /// Wait for both workers to exit
    ///
    /// Workers exit after `shutdown()`, after every producer has dropped its
    /// consumer handle, or on a fatal error. A driver failure is reported in
    /// preference to the converter failure it causes.
    pub async fn wait(self) -> Result<()> {
        let Pipeline {
            gate,
            converter,
            driver,
            pool,
            stats,
            ..
        } = self;
        drop(gate);

        let converter_result = converter
            .await
            .map_err(|e| Error::WorkerPanicked(format!("sample converter: {}", e)))
            .and_then(|result| result);
        let driver_result = driver
            .await
            .map_err(|_| Error::WorkerPanicked("playback driver".to_string()))
            .and_then(|result| result);

        info!("Pipeline stopped: {:?}", stats.snapshot(pool.stats()));

        driver_result.and(converter_result)
    }
}
