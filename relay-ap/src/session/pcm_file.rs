//! Local raw PCM session
//!
//! Plays headerless interleaved 16-bit little-endian files at the output
//! format. URIs are `file://` or `file:` URLs or plain paths. Delivery runs
//! on its own thread and pushes exactly one period per chunk, padding the
//! last chunk with silence, and waits and retries whenever the pipeline
//! rejects a chunk.

use super::{Credentials, Session, TrackInfo};
use crate::audio::types::{AudioFormat, PERIOD_BYTES};
use crate::error::{Error, Result};
use crate::playback::AudioConsumer;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait before offering a rejected chunk again (about half a period)
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Session that streams a local PCM file
pub struct PcmFileSession {
    application_key: Option<Vec<u8>>,
    username: Option<String>,
    format: AudioFormat,
    chunk_bytes: usize,
    retry_delay: Duration,
    track: Option<(PathBuf, TrackInfo)>,
}

impl PcmFileSession {
    /// # Arguments
    /// * `application_key` - Key contents, when one was configured
    pub fn new(application_key: Option<Vec<u8>>) -> Self {
        Self {
            application_key,
            username: None,
            format: AudioFormat::output(),
            chunk_bytes: PERIOD_BYTES,
            retry_delay: DEFAULT_RETRY_DELAY,
            track: None,
        }
    }

    /// Override chunk size and retry delay
    pub fn with_chunking(mut self, chunk_bytes: usize, retry_delay: Duration) -> Self {
        self.chunk_bytes = chunk_bytes;
        self.retry_delay = retry_delay;
        self
    }

    /// Map a track URI to a filesystem path
    pub fn resolve_uri(uri: &str) -> PathBuf {
        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
            .unwrap_or(uri);
        PathBuf::from(path)
    }
}

impl Session for PcmFileSession {
    fn login(&mut self, credentials: &Credentials) -> Result<()> {
        if credentials.username.trim().is_empty() {
            return Err(Error::Session("Login failed: username is empty".to_string()));
        }
        match &self.application_key {
            Some(key) => debug!("Application key loaded ({} bytes)", key.len()),
            None => debug!("No application key configured"),
        }
        info!("Logged in as {}", credentials.username);
        self.username = Some(credentials.username.clone());
        Ok(())
    }

    fn load(&mut self, uri: &str) -> Result<TrackInfo> {
        if self.username.is_none() {
            return Err(Error::Session("Cannot load a track before login".to_string()));
        }

        let path = Self::resolve_uri(uri);
        let metadata = std::fs::metadata(&path)
            .map_err(|e| Error::Session(format!("Cannot resolve {}: {}", uri, e)))?;
        if !metadata.is_file() {
            return Err(Error::Session(format!("{} is not a playable file", path.display())));
        }
        if metadata.len() % 2 != 0 {
            warn!("{} has a trailing partial sample", path.display());
        }

        let info = TrackInfo {
            uri: uri.to_string(),
            format: self.format,
            byte_len: Some(metadata.len()),
        };
        info!(
            "Loaded {} ({} bytes, {:.1}s)",
            path.display(),
            metadata.len(),
            self.format.duration_ms(metadata.len() as usize / 2) / 1000.0
        );
        self.track = Some((path, info.clone()));
        Ok(info)
    }

    fn play(&mut self, consumer: Arc<dyn AudioConsumer>, done: CancellationToken) -> Result<()> {
        let (path, info) = self
            .track
            .clone()
            .ok_or_else(|| Error::Session("No track loaded".to_string()))?;
        let file = File::open(&path)?;

        let format = info.format;
        let chunk_bytes = self.chunk_bytes;
        let retry_delay = self.retry_delay;

        std::thread::Builder::new()
            .name("pcm-producer".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(file);
                match stream_pcm(&mut reader, consumer.as_ref(), format, chunk_bytes, retry_delay, &done) {
                    Ok(chunks) => info!("Delivered {} chunks from {}", chunks, path.display()),
                    Err(e) => warn!("Reading {} failed: {}", path.display(), e),
                }
                done.cancel();
            })?;

        Ok(())
    }
}

/// Push `reader` into `consumer` one `chunk_bytes` chunk at a time
///
/// A short final chunk is padded with silence. Rejected chunks are offered
/// again after `retry_delay`. Stops early once `stop` is cancelled.
///
/// Returns the number of chunks accepted.
pub fn stream_pcm<R: Read>(
    reader: &mut R,
    consumer: &dyn AudioConsumer,
    format: AudioFormat,
    chunk_bytes: usize,
    retry_delay: Duration,
    stop: &CancellationToken,
) -> std::io::Result<u64> {
    let mut chunk = vec![0u8; chunk_bytes];
    let mut delivered = 0u64;

    loop {
        let filled = read_full(reader, &mut chunk)?;
        if filled == 0 {
            return Ok(delivered);
        }
        chunk[filled..].fill(0);

        while consumer.admit(&format, &chunk) == 0 {
            if stop.is_cancelled() {
                debug!("Delivery stopped after {} chunks", delivered);
                return Ok(delivered);
            }
            std::thread::sleep(retry_delay);
        }
        delivered += 1;

        if filled < chunk.len() {
            return Ok(delivered);
        }
    }
}

/// Read until `buf` is full or the reader is exhausted
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Accepts everything except every `reject_every`-th offer
    struct FlakyConsumer {
        offers: AtomicUsize,
        reject_every: usize,
        accepted: Mutex<Vec<Vec<u8>>>,
    }

    impl AudioConsumer for FlakyConsumer {
        fn admit(&self, _format: &AudioFormat, bytes: &[u8]) -> usize {
            let n = self.offers.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject_every > 0 && n % self.reject_every == 0 {
                return 0;
            }
            self.accepted.lock().unwrap().push(bytes.to_vec());
            bytes.len()
        }
    }

    fn consumer(reject_every: usize) -> FlakyConsumer {
        FlakyConsumer {
            offers: AtomicUsize::new(0),
            reject_every,
            accepted: Mutex::new(Vec::new()),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "listener".to_string(),
            password: String::new(),
        }
    }

    #[test]
    fn test_resolve_uri() {
        assert_eq!(PcmFileSession::resolve_uri("file:///tmp/a.pcm"), PathBuf::from("/tmp/a.pcm"));
        assert_eq!(PcmFileSession::resolve_uri("file:a.pcm"), PathBuf::from("a.pcm"));
        assert_eq!(PcmFileSession::resolve_uri("/tmp/b.pcm"), PathBuf::from("/tmp/b.pcm"));
    }

    #[test]
    fn test_stream_pads_final_chunk_and_retries() {
        let data: Vec<u8> = (0..10u8).collect();
        let consumer = consumer(2);
        let stop = CancellationToken::new();

        let delivered = stream_pcm(
            &mut Cursor::new(data),
            &consumer,
            AudioFormat::output(),
            4,
            Duration::from_millis(1),
            &stop,
        )
        .unwrap();

        assert_eq!(delivered, 3);
        let accepted = consumer.accepted.lock().unwrap();
        assert_eq!(
            *accepted,
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9, 0, 0]]
        );
    }

    #[test]
    fn test_stream_exact_multiple_has_no_padding_chunk() {
        let consumer = consumer(0);
        let delivered = stream_pcm(
            &mut Cursor::new(vec![1u8; 8]),
            &consumer,
            AudioFormat::output(),
            4,
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_stream_stops_when_cancelled() {
        // Rejects every offer
        let consumer = consumer(1);
        let stop = CancellationToken::new();
        stop.cancel();

        let delivered = stream_pcm(
            &mut Cursor::new(vec![1u8; 16]),
            &consumer,
            AudioFormat::output(),
            4,
            Duration::from_millis(1),
            &stop,
        )
        .unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_load_requires_login() {
        let mut session = PcmFileSession::new(None);
        assert!(matches!(session.load("/tmp"), Err(Error::Session(_))));
    }

    #[test]
    fn test_login_rejects_empty_username() {
        let mut session = PcmFileSession::new(None);
        let creds = Credentials {
            username: "  ".to_string(),
            password: String::new(),
        };
        assert!(matches!(session.login(&creds), Err(Error::Session(_))));
    }

    #[test]
    fn test_load_resolves_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; PERIOD_BYTES * 3]).unwrap();

        let mut session = PcmFileSession::new(None);
        session.login(&credentials()).unwrap();

        let uri = format!("file://{}", file.path().display());
        let info = session.load(&uri).unwrap();
        assert_eq!(info.byte_len, Some(PERIOD_BYTES as u64 * 3));
        assert_eq!(info.format, AudioFormat::output());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let mut session = PcmFileSession::new(None);
        session.login(&credentials()).unwrap();
        assert!(matches!(
            session.load("file:///nonexistent/track.pcm"),
            Err(Error::Session(_))
        ));
    }

    #[test]
    fn test_play_without_track_is_error() {
        let mut session = PcmFileSession::new(None);
        session.login(&credentials()).unwrap();
        let result = session.play(Arc::new(consumer(0)), CancellationToken::new());
        assert!(matches!(result, Err(Error::Session(_))));
    }

    #[test]
    fn test_play_delivers_whole_file_then_signals_done() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; 10]).unwrap();

        let mut session = PcmFileSession::new(None).with_chunking(4, Duration::from_millis(1));
        session.login(&credentials()).unwrap();
        session.load(&file.path().display().to_string()).unwrap();

        let consumer = Arc::new(consumer(0));
        let done = CancellationToken::new();
        session
            .play(Arc::clone(&consumer) as Arc<dyn AudioConsumer>, done.clone())
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !done.is_cancelled() {
            assert!(std::time::Instant::now() < deadline, "producer never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(consumer.accepted.lock().unwrap().len(), 3);
    }
}
