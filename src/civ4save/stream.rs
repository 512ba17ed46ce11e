//! Locating and inflating the compressed region of a save file.
//!
//! A save is laid out as `[header][0x78 0x9c deflate stream][tail]`. The
//! header and tail are plain bytes; only the middle is zlib-compressed, and
//! nothing in the file records where the stream ends. The end offset is
//! found by bisection: probe a candidate end, classify the failure as
//! "stream truncated" (need more bytes) or "stream corrupt/overrun" (went
//! too far), and tighten the bracket until the probe lands on the real end.

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, info, trace};

use super::error::{Result, SaveError};

/// First two bytes of a zlib stream at the default compression level.
const ZLIB_SIGNATURE: [u8; 2] = [0x78, 0x9c];

/// Upper bound on bisection probes. A bracket over any realistic file
/// converges in well under 40 halvings; past that the input is malformed.
const PROBE_BUDGET: usize = 50;

const INFLATE_CHUNK: usize = 64 * 1024;

/// The reassembled logical buffer plus the byte counts of each region.
#[derive(Debug)]
pub struct SaveStream {
    /// `header ++ inflate(body) ++ tail`
    pub buffer: Vec<u8>,
    pub raw_len: usize,
    pub header_len: usize,
    pub compressed_len: usize,
    pub inflated_len: usize,
    pub tail_len: usize,
}

enum Probe {
    /// Stream terminated cleanly; carries the output and the exact number
    /// of input bytes the stream occupied.
    Complete(Vec<u8>, usize),
    Truncated,
    Corrupt,
}

/// Find the compressed region in `raw`, inflate it, and splice the logical
/// buffer back together. Header and tail bytes pass through unchanged.
pub fn locate(raw: &[u8]) -> Result<SaveStream> {
    let z_start = raw
        .windows(2)
        .position(|w| w == ZLIB_SIGNATURE)
        .ok_or(SaveError::NotASaveFile("no zlib signature found"))?;
    debug!("zlib signature at offset {}", z_start);

    let (body, z_end) = bisect_stream_end(raw, z_start)?;
    info!(
        "compressed region: {}..{} ({} bytes -> {} bytes)",
        z_start,
        z_end,
        z_end - z_start,
        body.len()
    );

    let mut buffer = Vec::with_capacity(z_start + body.len() + (raw.len() - z_end));
    buffer.extend_from_slice(&raw[..z_start]);
    let inflated_len = body.len();
    buffer.extend(body);
    buffer.extend_from_slice(&raw[z_end..]);

    Ok(SaveStream {
        buffer,
        raw_len: raw.len(),
        header_len: z_start,
        compressed_len: z_end - z_start,
        inflated_len,
        tail_len: raw.len() - z_end,
    })
}

/// Bisect `[z_start, raw.len())` for the end of the deflate stream.
///
/// Probe classification:
/// - stream ends inside the slice: done, the inflater reports the exact
///   end offset (a slice past the real end still terminates cleanly);
/// - input exhausted before the stream terminator: raise `low`;
/// - invalid compressed data: lower `high`.
///
/// Probing the same offset twice in a row means the bracket is exhausted;
/// at that point the stream either inflates completely or the file is not
/// a save at all.
fn bisect_stream_end(raw: &[u8], z_start: usize) -> Result<(Vec<u8>, usize)> {
    let mut low = z_start;
    let mut high = raw.len();
    let mut prev = 0usize;

    for guess in 0..PROBE_BUDGET {
        let mid = (low + high) / 2;
        if mid == prev {
            return match probe_inflate(&raw[z_start..mid]) {
                Probe::Complete(body, consumed) => Ok((body, z_start + consumed)),
                _ => Err(SaveError::NotASaveFile("compressed stream never terminates")),
            };
        }
        match probe_inflate(&raw[z_start..mid]) {
            Probe::Complete(body, consumed) => {
                trace!("probe {}: stream end at +{}", guess, consumed);
                return Ok((body, z_start + consumed));
            }
            Probe::Truncated => {
                trace!("probe {}: {} truncated", guess, mid);
                low = mid + 1;
            }
            Probe::Corrupt => {
                trace!("probe {}: {} corrupt", guess, mid);
                high = mid.saturating_sub(1);
            }
        }
        prev = mid;
    }

    Err(SaveError::NotASaveFile(
        "stream end search did not converge within probe budget",
    ))
}

/// Attempt to inflate one candidate slice as a complete zlib stream.
fn probe_inflate(data: &[u8]) -> Probe {
    let mut inflater = Decompress::new(true);
    let mut out: Vec<u8> = Vec::with_capacity(INFLATE_CHUNK);

    loop {
        if out.capacity() == out.len() {
            out.reserve(INFLATE_CHUNK);
        }
        let in_before = inflater.total_in();
        let out_before = inflater.total_out();

        let status = match inflater.decompress_vec(
            &data[in_before as usize..],
            &mut out,
            FlushDecompress::Finish,
        ) {
            Ok(status) => status,
            Err(_) => return Probe::Corrupt,
        };

        match status {
            Status::StreamEnd => return Probe::Complete(out, inflater.total_in() as usize),
            Status::Ok | Status::BufError => {
                let progressed =
                    inflater.total_in() > in_before || inflater.total_out() > out_before;
                if !progressed && inflater.total_in() as usize >= data.len() {
                    return Probe::Truncated;
                }
                if !progressed && out.len() < out.capacity() {
                    // No input left to consume and output space available:
                    // the stream is incomplete.
                    return Probe::Truncated;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn reassembles_header_body_and_tail() {
        let header = b"HDR0";
        let body = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let tail = b"TAIL";

        let mut raw = header.to_vec();
        raw.extend(deflate(&body));
        raw.extend_from_slice(tail);

        let stream = locate(&raw).unwrap();
        assert_eq!(stream.header_len, 4);
        assert_eq!(stream.tail_len, 4);
        assert_eq!(&stream.buffer[..4], header);
        assert_eq!(&stream.buffer[4..4 + body.len()], &body[..]);
        assert_eq!(&stream.buffer[4 + body.len()..], tail);
        assert_eq!(stream.inflated_len, body.len());
    }

    #[test]
    fn missing_signature_is_not_a_save() {
        let raw = vec![0u8; 256];
        assert!(matches!(locate(&raw), Err(SaveError::NotASaveFile(_))));
    }

    #[test]
    fn truncated_stream_fails_within_budget() {
        let body = b"some compressible payload ".repeat(50);
        let mut raw = b"HDR0".to_vec();
        let compressed = deflate(&body);
        // Drop the back half of the stream so no terminator exists.
        raw.extend_from_slice(&compressed[..compressed.len() / 2]);

        assert!(matches!(locate(&raw), Err(SaveError::NotASaveFile(_))));
    }

    #[test]
    fn garbage_after_signature_fails() {
        let mut raw = b"HDR0".to_vec();
        raw.extend_from_slice(&ZLIB_SIGNATURE);
        raw.extend_from_slice(&[0x13, 0x37, 0x00, 0xff].repeat(16));
        assert!(matches!(locate(&raw), Err(SaveError::NotASaveFile(_))));
    }
}
