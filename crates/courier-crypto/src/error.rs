//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure, or ciphertext too
    /// short to contain a tag).
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RandomFailed,
}
