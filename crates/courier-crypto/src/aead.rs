//! AES-256-GCM encryption, the `encrypt_packet`/`decrypt_packet` step of the
//! send/receive pipelines (§4.3.3/§4.3.4).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::CryptoError;
use crate::random;

/// A 256-bit AES-GCM key.
pub type Key = [u8; 32];

/// A 96-bit GCM nonce, used as the session's `iv`.
pub type Iv = [u8; 12];

/// Symmetric encrypt/decrypt contract a session uses to protect a frame's
/// payload once a key has been agreed during the handshake.
pub trait Crypto: Send + Sync {
    /// Generates a fresh key/iv pair for a new session.
    fn create_key(&self) -> Result<(Key, Iv), CryptoError>;

    /// Encrypts `plaintext` under `key`/`iv`. Empty input returns empty
    /// output unencrypted — sessions with `encrypt_mode = false` route
    /// through here too and must see their payload pass through untouched.
    fn encrypt(&self, plaintext: &[u8], key: &Key, iv: &Iv) -> Result<Vec<u8>, CryptoError>;

    /// Inverse of [`Crypto::encrypt`].
    fn decrypt(&self, ciphertext: &[u8], key: &Key, iv: &Iv) -> Result<Vec<u8>, CryptoError>;
}

/// The concrete AES-256-GCM implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCrypto;

impl Crypto for AesGcmCrypto {
    fn create_key(&self) -> Result<(Key, Iv), CryptoError> {
        Ok((random::random_32()?, random::random_12()?))
    }

    fn encrypt(&self, plaintext: &[u8], key: &Key, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
        let nonce = Nonce::from_slice(iv);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &Key, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
        let nonce = Nonce::from_slice(iv);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plaintext_round_trips_to_empty() {
        let crypto = AesGcmCrypto;
        let (key, iv) = crypto.create_key().unwrap();
        let ciphertext = crypto.encrypt(&[], &key, &iv).unwrap();
        assert!(ciphertext.is_empty());
        let plaintext = crypto.decrypt(&ciphertext, &key, &iv).unwrap();
        assert!(plaintext.is_empty());
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let crypto = AesGcmCrypto;
        let (key, iv) = crypto.create_key().unwrap();
        let message = b"route this payload";
        let ciphertext = crypto.encrypt(message, &key, &iv).unwrap();
        assert_ne!(ciphertext, message);
        let plaintext = crypto.decrypt(&ciphertext, &key, &iv).unwrap();
        assert_eq!(plaintext, message);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let crypto = AesGcmCrypto;
        let (key, iv) = crypto.create_key().unwrap();
        let mut ciphertext = crypto.encrypt(b"payload", &key, &iv).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(crypto.decrypt(&ciphertext, &key, &iv).is_err());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let crypto = AesGcmCrypto;
        let (key, iv) = crypto.create_key().unwrap();
        let (other_key, _) = crypto.create_key().unwrap();
        let ciphertext = crypto.encrypt(b"payload", &key, &iv).unwrap();
        assert!(crypto.decrypt(&ciphertext, &other_key, &iv).is_err());
    }
}
