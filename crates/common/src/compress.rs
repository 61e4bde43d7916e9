use flate2::read::GzDecoder;
use std::io::Read;

/// Gzip magic bytes (`1f 8b`).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Inflates a gzip payload. Returns `None` when the bytes are not gzip or
/// decompression fails; the caller decides whether that is worth a log line
/// and keeps the original bytes.
pub fn inflate_if_gzip(bytes: &[u8]) -> Option<Vec<u8>> {
    if !is_gzip(bytes) {
        return None;
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out).ok()?;
    Some(out)
}
