//! Audio sink that records instead of playing
//!
//! Writes are captured into a shared log so a test can inspect exactly what
//! the playback driver handed to the "device". An optional per-write delay
//! simulates a device that takes time to consume each period, and a crashing
//! sink panics on its first write.

use relay_ap::audio::output::AudioSink;
use relay_ap::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything a RecordingSink saw
#[derive(Debug, Default)]
pub struct SinkLog {
    pub started: bool,
    pub stopped: bool,
    pub closed: bool,
    pub writes: Vec<Vec<i16>>,
}

/// Shared handle to a sink's log
pub type SharedLog = Arc<Mutex<SinkLog>>;

pub struct RecordingSink {
    log: SharedLog,
    write_delay: Option<Duration>,
    panic_on_write: bool,
}

impl RecordingSink {
    /// Create a sink and the log it writes to
    pub fn new() -> (Self, SharedLog) {
        let log = SharedLog::default();
        (
            Self {
                log: Arc::clone(&log),
                write_delay: None,
                panic_on_write: false,
            },
            log,
        )
    }

    /// Sink that sleeps for `delay` on every write
    pub fn slow(delay: Duration) -> (Self, SharedLog) {
        let (mut sink, log) = Self::new();
        sink.write_delay = Some(delay);
        (sink, log)
    }

    /// Sink whose device crashes on the first write
    pub fn crashing() -> (Self, SharedLog) {
        let (mut sink, log) = Self::new();
        sink.panic_on_write = true;
        (sink, log)
    }
}

impl AudioSink for RecordingSink {
    fn start(&mut self) -> Result<()> {
        self.log.lock().unwrap().started = true;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.panic_on_write {
            panic!("device driver crashed");
        }
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        self.log.lock().unwrap().writes.push(samples.to_vec());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().unwrap().stopped = true;
        Ok(())
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}
