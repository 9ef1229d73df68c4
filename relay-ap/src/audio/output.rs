//! Audio output using cpal
//!
//! The playback driver sees the device through the blocking [`AudioSink`]
//! trait: open, start, write one period, stop, close (drop). cpal itself is
//! callback driven, so [`CpalSink`] bridges the two with a lock-free ring
//! buffer holding a few periods. `write` pushes a period into the ring and
//! only returns once all of it fits, which paces the caller to the device
//! clock. `stop` waits for the ring to play out before pausing the stream.
//!
//! Unless told otherwise the device buffer is requested at exactly one
//! period, clamped to what the device supports.

use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig, SupportedBufferSize};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep between attempts to push into a full ring
const WRITE_RETRY_SLEEP: Duration = Duration::from_millis(1);

/// A write that makes no progress for this long means the device stalled
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum ring length in periods
const RING_PERIODS: usize = 4;

/// Minimum ring length in milliseconds of audio
const RING_CAPACITY_MS: usize = 100;

/// Longest wait for queued samples to play out on stop
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Blocking hardware playback sink
///
/// Opening happens in the implementor's constructor and closing in `Drop`.
pub trait AudioSink {
    /// Begin the hardware stream
    fn start(&mut self) -> Result<()>;

    /// Write one period of interleaved samples, blocking until the device
    /// has taken it
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Halt the hardware stream
    fn stop(&mut self) -> Result<()>;
}

/// Fixed device configuration requested at open time
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Device name (None = default device)
    pub device: Option<String>,
    /// Channels and sample rate
    pub format: AudioFormat,
    /// Samples per period, channel-interleaved
    pub period_samples: usize,
    /// Device buffer size in frames (None = one period)
    pub buffer_frames: Option<u32>,
}

/// Audio output sink using cpal.
pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    period_samples: usize,
    stream: Option<Stream>,
    /// Producer half of the period ring (consumer lives in the callback)
    producer: Option<HeapProd<i16>>,
    /// Stream error flag - set by audio callback on error
    error_flag: Arc<AtomicBool>,
    /// Callbacks that found fewer samples than requested
    underruns: Arc<AtomicU64>,
}

impl CpalSink {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device with the fixed format in `settings`.
    ///
    /// A named device that cannot be found falls back to the default
    /// device. A device that does not support the requested channels and
    /// rate in i16 or f32 is an error; no resampling is done here.
    pub fn open(settings: &OutputSettings) -> Result<Self> {
        if settings.period_samples == 0
            || settings.period_samples % settings.format.channels.max(1) as usize != 0
        {
            return Err(Error::AudioOutput(format!(
                "Period of {} samples is not a whole number of {}-channel frames",
                settings.period_samples, settings.format.channels
            )));
        }

        let host = cpal::default_host();

        let device = match settings.device.as_ref() {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", name);

        let (mut config, sample_format, supported_buffer) =
            Self::select_config(&device, settings.format)?;

        let period_frames = (settings.period_samples / settings.format.channels.max(1) as usize) as u32;
        config.buffer_size = device_buffer_size(settings.buffer_frames, period_frames, &supported_buffer);
        debug!("Requested device buffer: {:?}", config.buffer_size);

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, period={} samples",
            config.sample_rate.0, config.channels, sample_format, settings.period_samples
        );

        Ok(Self {
            device,
            config,
            sample_format,
            period_samples: settings.period_samples,
            stream: None,
            producer: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Find a supported config matching `format`, preferring i16 samples.
    fn select_config(
        device: &Device,
        format: AudioFormat,
    ) -> Result<(StreamConfig, SampleFormat, SupportedBufferSize)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
            .filter(|config| {
                config.channels() == format.channels
                    && config.min_sample_rate().0 <= format.sample_rate
                    && config.max_sample_rate().0 >= format.sample_rate
            })
            .collect();

        for wanted in [SampleFormat::I16, SampleFormat::F32] {
            if let Some(range) = supported.iter().find(|c| c.sample_format() == wanted) {
                let buffer = range.buffer_size().clone();
                let config = range
                    .clone()
                    .with_sample_rate(cpal::SampleRate(format.sample_rate))
                    .config();
                return Ok((config, wanted, buffer));
            }
        }

        Err(Error::AudioOutput(format!(
            "Device does not support {} channels at {} Hz (i16 or f32)",
            format.channels, format.sample_rate
        )))
    }

    /// Build the i16 stream: the callback copies straight from the ring
    fn build_stream_i16(&self, mut consumer: HeapCons<i16>) -> Result<Stream> {
        let error_flag = Arc::clone(&self.error_flag);
        let underruns = Arc::clone(&self.underruns);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let filled = consumer.pop_slice(data);
                    if filled < data.len() {
                        data[filled..].fill(0);
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Build the f32 stream: samples are scaled from i16 in the callback
    fn build_stream_f32(&self, mut consumer: HeapCons<i16>) -> Result<Stream> {
        let error_flag = Arc::clone(&self.error_flag);
        let underruns = Arc::clone(&self.underruns);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut short = false;
                    for out in data.iter_mut() {
                        *out = match consumer.try_pop() {
                            Some(sample) => sample as f32 / 32768.0,
                            None => {
                                short = true;
                                0.0
                            }
                        };
                    }
                    if short {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        info!("Starting audio stream");

        let capacity = ring_capacity(self.period_samples, self.config.channels, self.config.sample_rate.0);
        debug!("Output ring holds {} samples", capacity);
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();

        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream_i16(consumer)?,
            SampleFormat::F32 => self.build_stream_f32(consumer)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.producer = Some(producer);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let producer = self
            .producer
            .as_mut()
            .ok_or_else(|| Error::AudioOutput("Write to a stream that is not started".to_string()))?;

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < samples.len() {
            if self.error_flag.load(Ordering::SeqCst) {
                return Err(Error::AudioOutput("Audio stream reported an error".to_string()));
            }

            let pushed = producer.push_slice(&samples[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }

            if last_progress.elapsed() >= WRITE_STALL_TIMEOUT {
                return Err(Error::AudioOutput(format!(
                    "Audio device stopped consuming samples ({} of {} written)",
                    offset,
                    samples.len()
                )));
            }
            std::thread::sleep(WRITE_RETRY_SLEEP);
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let drained = match self.producer.take() {
            Some(producer) => drain_ring(&producer, &self.error_flag, DRAIN_TIMEOUT),
            None => Ok(()),
        };

        if let Some(stream) = self.stream.take() {
            // Let the device play out its own buffer too
            if let BufferSize::Fixed(frames) = self.config.buffer_size {
                std::thread::sleep(Duration::from_secs_f64(
                    frames as f64 / self.config.sample_rate.0.max(1) as f64,
                ));
            }
            info!(
                "Stopping audio stream ({} underruns)",
                self.underruns.load(Ordering::Relaxed)
            );
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        drained
    }
}

/// Device buffer request: the configured size, else one period, clamped to
/// the range the device reports
fn device_buffer_size(
    requested: Option<u32>,
    period_frames: u32,
    supported: &SupportedBufferSize,
) -> BufferSize {
    let frames = requested.unwrap_or(period_frames);
    match supported {
        SupportedBufferSize::Range { min, max } => {
            let clamped = frames.clamp(*min, (*max).max(*min));
            if clamped != frames {
                warn!(
                    "Device buffer of {} frames not supported, using {} (range {}-{})",
                    frames, clamped, min, max
                );
            }
            BufferSize::Fixed(clamped)
        }
        SupportedBufferSize::Unknown => BufferSize::Fixed(frames),
    }
}

/// Ring length in samples: several periods, and never less than
/// `RING_CAPACITY_MS` of audio
fn ring_capacity(period_samples: usize, channels: u16, sample_rate: u32) -> usize {
    let by_time = sample_rate as usize * channels as usize * RING_CAPACITY_MS / 1000;
    (period_samples * RING_PERIODS).max(by_time).max(1)
}

/// Wait until the callback has consumed everything in the ring
fn drain_ring(producer: &HeapProd<i16>, error_flag: &AtomicBool, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while producer.occupied_len() > 0 {
        if error_flag.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput(
                "Audio stream reported an error while draining".to_string(),
            ));
        }
        if Instant::now() >= deadline {
            warn!(
                "Discarding {} samples that did not play out within {:?}",
                producer.occupied_len(),
                timeout
            );
            break;
        }
        std::thread::sleep(WRITE_RETRY_SLEEP);
    }
    Ok(())
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
