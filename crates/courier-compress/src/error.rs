//! Compression error types.

use thiserror::Error;

/// Errors raised while compressing or decompressing a payload.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The DEFLATE stream could not be written to completion.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// The input was not a valid DEFLATE stream.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
}
