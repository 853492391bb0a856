//! # COURIER Compress
//!
//! DEFLATE compression for the COURIER session protocol: the
//! `compress_packet`/`decompress_packet` stage of the send/receive
//! pipelines (§4.3.3/§4.3.4), run ahead of encryption on send and after
//! decryption on receive.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deflate;
pub mod error;

pub use deflate::{Compressor, DeflateCompressor};
pub use error::CompressError;
