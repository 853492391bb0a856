//! DEFLATE compression, the `compress_packet`/`decompress_packet` step of
//! the send/receive pipelines (§4.3.3/§4.3.4).

use std::io::Write;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Read;

use crate::error::CompressError;

/// Compress/decompress contract a session uses before encrypting (on send)
/// and after decrypting (on receive).
pub trait Compressor: Send + Sync {
    /// Compresses `data`. Empty input compresses to empty output.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError>;

    /// Inverse of [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError>;
}

/// The concrete DEFLATE implementation, at the default compression level.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| CompressError::CompressionFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CompressError::CompressionFailed(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CompressError::DecompressionFailed(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_trips_to_empty() {
        let c = DeflateCompressor;
        assert!(c.compress(&[]).unwrap().is_empty());
        assert!(c.decompress(&[]).unwrap().is_empty());
    }

    #[test]
    fn compress_then_decompress_round_trips() {
        let c = DeflateCompressor;
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = c.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn garbage_input_fails_to_decompress() {
        let c = DeflateCompressor;
        assert!(c.decompress(&[0xFF, 0x00, 0xDE, 0xAD]).is_err());
    }
}
