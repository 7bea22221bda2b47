//! zlib compression for reference payloads.

use crate::util::{SlotWatchError, SlotWatchResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Highest accepted zlib level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Default zlib level used by the store.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Checks that `level` is a valid zlib level.
pub fn validate_level(level: u32) -> SlotWatchResult<()> {
    if level > MAX_COMPRESSION_LEVEL {
        return Err(SlotWatchError::Config(format!(
            "compression level {level} is outside 0..={MAX_COMPRESSION_LEVEL}"
        )));
    }
    Ok(())
}

/// Compresses `data` into a zlib stream.
pub fn compress(data: &[u8], level: u32) -> SlotWatchResult<Vec<u8>> {
    validate_level(level)?;
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder.write_all(data).map_err(SlotWatchError::Compress)?;
    encoder.finish().map_err(SlotWatchError::Compress)
}

/// Inflates a zlib stream produced by [`compress`].
///
/// The stream checksum is verified, and when `expected_len` is given the
/// output length must match it exactly. `expected_len` comes from the cache
/// file and is not trusted: it only bounds how much is inflated, never how
/// much is allocated up front. Nothing is returned on failure.
pub fn decompress(name: &str, data: &[u8], expected_len: Option<u64>) -> SlotWatchResult<Vec<u8>> {
    let hint = data.len().saturating_mul(MAX_PREALLOC_RATIO);
    let capacity = expected_len.map_or(hint, |len| {
        usize::try_from(len).unwrap_or(usize::MAX).min(hint)
    });
    let mut out = Vec::with_capacity(capacity);
    let mut decoder = ZlibDecoder::new(data);
    let read = match expected_len {
        // One byte past the expected length is enough to detect an overrun.
        Some(expected) => decoder
            .by_ref()
            .take(expected.saturating_add(1))
            .read_to_end(&mut out),
        None => decoder.read_to_end(&mut out),
    };
    read.map_err(|source| decompress_error(name, source))?;
    if let Some(expected) = expected_len {
        if out.len() as u64 != expected {
            return Err(decompress_error(
                name,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("inflated {} bytes, expected {expected}", out.len()),
                ),
            ));
        }
    }
    Ok(out)
}

/// Upper bound on preallocation, as a multiple of the compressed size.
const MAX_PREALLOC_RATIO: usize = 8;

fn decompress_error(name: &str, source: std::io::Error) -> SlotWatchError {
    SlotWatchError::Decompress {
        name: name.to_string(),
        source,
    }
}
