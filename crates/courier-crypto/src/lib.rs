//! # COURIER Crypto
//!
//! Symmetric encryption for the COURIER session protocol: AES-256-GCM keyed
//! per session during the handshake (§4.3.2), used to protect a frame's
//! payload in the encrypt/decrypt stage of the send/receive pipelines
//! (§4.3.3/§4.3.4).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod random;

pub use aead::{AesGcmCrypto, Crypto, Iv, Key};
pub use error::CryptoError;
