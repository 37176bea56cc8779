//! zlib compression of entry payloads.
//!
//! Compressed payload format: `[uncompressed_size: u64 LE][zlib stream]`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Largest payload the decoder will inflate.
pub const MAX_UNCOMPRESSED_SIZE: u64 = 1024 * 1024 * 1024;

/// Upper bound on the pre-allocation per compressed byte.
const INITIAL_CAPACITY_RATIO: u64 = 64;

/// Compress a payload.
///
/// Returns `None` when `level` is 0, the payload is empty, or compression
/// does not save space; the caller then stores the payload raw.
pub fn compress(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    if level == 0 || data.is_empty() {
        return Ok(None);
    }

    let compression_level = match level {
        1 => Compression::fast(),
        2..=5 => Compression::default(),
        _ => Compression::best(),
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), compression_level);
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() + 8 >= data.len() {
        return Ok(None);
    }

    let mut result = Vec::with_capacity(8 + compressed.len());
    result.extend_from_slice(&(data.len() as u64).to_le_bytes());
    result.extend_from_slice(&compressed);
    Ok(Some(result))
}

/// Decompress a payload written by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::corrupt("compressed payload shorter than its size prefix"));
    }

    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&data[..8]);
    let uncompressed_size = u64::from_le_bytes(size_bytes);
    if uncompressed_size > MAX_UNCOMPRESSED_SIZE {
        return Err(Error::corrupt(format!(
            "compressed payload claims {} bytes",
            uncompressed_size
        )));
    }

    let mut decoder = ZlibDecoder::new(&data[8..]).take(uncompressed_size + 1);
    // The size prefix is untrusted; grow past the hint as the stream inflates.
    let hint = uncompressed_size.min((data.len() as u64 - 8).saturating_mul(INITIAL_CAPACITY_RATIO));
    let mut decompressed = Vec::with_capacity(hint as usize);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::corrupt(format!("zlib: {}", e)))?;

    if decompressed.len() as u64 != uncompressed_size {
        return Err(Error::corrupt(format!(
            "payload inflated to {} bytes, expected {}",
            decompressed.len(),
            uncompressed_size
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 10) as u8).collect();
        let compressed = compress(&data, 6).unwrap().expect("repetitive data compresses");
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_level_zero_and_incompressible() {
        assert!(compress(b"anything", 0).unwrap().is_none());
        assert!(compress(&[], 9).unwrap().is_none());
        assert!(compress(&[1, 2, 3, 4], 9).unwrap().is_none());
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(matches!(decompress(&[1, 2, 3]), Err(Error::CorruptArchive(_))));

        let mut bogus = 16u64.to_le_bytes().to_vec();
        bogus.extend_from_slice(&[0xFF; 12]);
        assert!(matches!(decompress(&bogus), Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn test_size_prefix_larger_than_stream() {
        let data = vec![7u8; 4096];
        let mut packed = compress(&data, 9).unwrap().expect("compresses");
        packed[..8].copy_from_slice(&(MAX_UNCOMPRESSED_SIZE - 1).to_le_bytes());
        let err = decompress(&packed).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(ref msg) if msg.contains("4096")));
    }
}
