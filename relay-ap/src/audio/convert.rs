//! Byte to sample conversion
//!
//! Producers deliver interleaved signed 16-bit little-endian PCM. Each byte
//! pair `[low, high]` becomes one `i16` (`low | high << 8`), keeping position.

use super::types::BYTES_PER_SAMPLE;

/// Decode little-endian 16-bit PCM into `out`, replacing its contents
///
/// `out` keeps its capacity so a pooled buffer is reused without
/// reallocating. After the call `out.len()` equals the decoded sample count;
/// nothing from the buffer's previous use survives. A trailing odd byte is
/// ignored (the ingest gate never admits odd payloads).
///
/// Returns the number of samples decoded.
pub fn decode_le_i16(bytes: &[u8], out: &mut Vec<i16>) -> usize {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
    );
    out.len()
}
