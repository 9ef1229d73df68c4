//! Playback driver worker
//!
//! Owns the output device for the life of the pipeline. Each received frame
//! is checked against the period length, written synchronously (the write
//! blocks for roughly one period, which is what paces the whole pipeline),
//! and its buffer handed back to the pool.
//!
//! The driver runs on a dedicated OS thread: the device write blocks and the
//! cpal stream cannot move between threads.

use super::buffer_pool::BufferPool;
use super::stats::PipelineStats;
use crate::audio::output::AudioSink;
use crate::audio::types::{AudioFormat, SampleFrame};
use crate::error::Result;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A frame whose length differs from the device period
///
/// Means the converter and driver disagree about chunk sizing. Playing it
/// would write partial or overlong audio, so it is never recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame of {actual} samples reached the playback driver, expected exactly {expected}")]
pub struct FrameLengthViolation {
    pub expected: usize,
    pub actual: usize,
}

/// Check a frame against the period length
pub fn check_frame_length(
    frame: &SampleFrame,
    expected: usize,
) -> std::result::Result<(), FrameLengthViolation> {
    if frame.len() == expected {
        Ok(())
    } else {
        Err(FrameLengthViolation {
            expected,
            actual: frame.len(),
        })
    }
}

/// A started sink that is stopped again on every exit path
///
/// Dropping it (normal return, `?`, or unwinding) stops the stream; the sink
/// itself is closed when it is dropped right after.
pub struct ActiveStream<S: AudioSink> {
    sink: S,
    stopped: bool,
}

impl<S: AudioSink> ActiveStream<S> {
    /// Start `sink`, taking ownership of it
    pub fn start(mut sink: S) -> Result<Self> {
        sink.start()?;
        Ok(Self {
            sink,
            stopped: false,
        })
    }

    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.sink.write(samples)
    }

    /// Stop explicitly, reporting a failure to stop
    pub fn finish(mut self) -> Result<()> {
        self.stopped = true;
        self.sink.stop()
    }
}

impl<S: AudioSink> Drop for ActiveStream<S> {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(e) = self.sink.stop() {
                warn!("Failed to stop audio stream: {}", e);
            }
        }
    }
}

/// Single worker bound to the playback device
pub struct PlaybackDriver<S: AudioSink> {
    stream: ActiveStream<S>,
    pool: Arc<BufferPool>,
    stats: Arc<PipelineStats>,
    period_samples: usize,
    format: AudioFormat,
}

impl<S: AudioSink> PlaybackDriver<S> {
    /// # Arguments
    /// * `stream` - Started output stream
    /// * `format` - Format the device was opened with
    /// * `period_samples` - Exact frame length the device accepts
    pub fn new(
        stream: ActiveStream<S>,
        format: AudioFormat,
        period_samples: usize,
        pool: Arc<BufferPool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            stream,
            pool,
            stats,
            period_samples,
            format,
        }
    }

    /// Play frames until the frame queue is closed and drained
    ///
    /// Must be called from a plain thread, not from inside an async runtime.
    pub fn run(mut self, mut frames: mpsc::Receiver<SampleFrame>) -> Result<()> {
        let mut last_format = self.format;

        while let Some(frame) = frames.blocking_recv() {
            check_frame_length(&frame, self.period_samples)?;

            if frame.format != last_format {
                warn!(
                    "Frame format {}ch/{}Hz differs from device format {}ch/{}Hz",
                    frame.format.channels,
                    frame.format.sample_rate,
                    self.format.channels,
                    self.format.sample_rate
                );
                last_format = frame.format;
            }

            self.stream.write(frame.samples())?;
            let played = PipelineStats::incr(&self.stats.frames_played);
            debug!("Played frame #{}", played);

            self.pool.put(frame.into_samples());
        }

        info!("Frame queue closed, stopping playback");
        self.stream.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum SinkEvent {
        Start,
        Write(Vec<i16>),
        Stop,
        Close,
    }

    struct LogSink {
        log: Arc<Mutex<Vec<SinkEvent>>>,
        panic_on_write: bool,
    }

    impl AudioSink for LogSink {
        fn start(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(SinkEvent::Start);
            Ok(())
        }

        fn write(&mut self, samples: &[i16]) -> Result<()> {
            if self.panic_on_write {
                panic!("device exploded");
            }
            self.log.lock().unwrap().push(SinkEvent::Write(samples.to_vec()));
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(SinkEvent::Stop);
            Ok(())
        }
    }

    impl Drop for LogSink {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(SinkEvent::Close);
        }
    }

    const PERIOD: usize = 4;

    fn driver(
        panic_on_write: bool,
    ) -> (PlaybackDriver<LogSink>, Arc<Mutex<Vec<SinkEvent>>>, Arc<BufferPool>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = LogSink {
            log: Arc::clone(&log),
            panic_on_write,
        };
        let pool = Arc::new(BufferPool::new(2, PERIOD));
        let driver = PlaybackDriver::new(
            ActiveStream::start(sink).unwrap(),
            AudioFormat::output(),
            PERIOD,
            Arc::clone(&pool),
            Arc::new(PipelineStats::new()),
        );
        (driver, log, pool)
    }

    fn frame(samples: &[i16]) -> SampleFrame {
        SampleFrame::new(AudioFormat::output(), samples.to_vec())
    }

    #[test]
    fn test_check_frame_length() {
        assert!(check_frame_length(&frame(&[0; 2048]), 2048).is_ok());
        assert_eq!(
            check_frame_length(&frame(&[0; 2047]), 2048),
            Err(FrameLengthViolation {
                expected: 2048,
                actual: 2047
            })
        );
        assert_eq!(
            check_frame_length(&frame(&[0; 4096]), 2048).unwrap_err().actual,
            4096
        );
    }

    #[test]
    fn test_plays_frames_in_order_and_returns_buffers() {
        let (driver, log, pool) = driver(false);
        let (tx, rx) = mpsc::channel(8);
        tx.blocking_send(frame(&[1, 2, 3, 4])).unwrap();
        tx.blocking_send(frame(&[5, 6, 7, 8])).unwrap();
        tx.blocking_send(frame(&[9, 10, 11, 12])).unwrap();
        drop(tx);

        driver.run(rx).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                SinkEvent::Start,
                SinkEvent::Write(vec![1, 2, 3, 4]),
                SinkEvent::Write(vec![5, 6, 7, 8]),
                SinkEvent::Write(vec![9, 10, 11, 12]),
                SinkEvent::Stop,
                SinkEvent::Close,
            ]
        );

        // Pool holds 2, third return was dropped
        let stats = pool.stats();
        assert_eq!(stats.returns, 2);
        assert_eq!(stats.drops, 1);
    }

    #[test]
    fn test_wrong_length_is_fatal_and_stops_stream() {
        let (driver, log, _pool) = driver(false);
        let (tx, rx) = mpsc::channel(8);
        tx.blocking_send(frame(&[1, 2, 3, 4])).unwrap();
        tx.blocking_send(frame(&[1, 2, 3])).unwrap();
        tx.blocking_send(frame(&[5, 6, 7, 8])).unwrap();
        drop(tx);

        let err = driver.run(rx).unwrap_err();
        match err {
            Error::ProtocolViolation(v) => {
                assert_eq!(v.expected, PERIOD);
                assert_eq!(v.actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                SinkEvent::Start,
                SinkEvent::Write(vec![1, 2, 3, 4]),
                SinkEvent::Stop,
                SinkEvent::Close,
            ],
            "short frame never written, later frames never played"
        );
    }

    #[test]
    fn test_panic_still_stops_stream() {
        let (driver, log, _pool) = driver(true);
        let (tx, rx) = mpsc::channel(8);
        tx.blocking_send(frame(&[1, 2, 3, 4])).unwrap();
        drop(tx);

        let result = std::thread::spawn(move || driver.run(rx)).join();
        assert!(result.is_err());

        let log = log.lock().unwrap();
        assert_eq!(*log, vec![SinkEvent::Start, SinkEvent::Stop, SinkEvent::Close]);
    }
}
