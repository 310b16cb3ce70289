//! Payload encryption keyed by a Diffie-Hellman derived value.
//!
//! The big-endian bytes of the group value go through HKDF-SHA256 to give a
//! ChaCha20-Poly1305 key. Sealed payloads are `nonce || ciphertext || tag`
//! with a fresh random nonce per payload.

use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

const HKDF_INFO: &[u8] = b"RINGCHAT-V1-GROUP-KEY";

/// Every ring member must derive the same key, so the salt is fixed.
const HKDF_SALT: &[u8] = b"RINGCHAT-V1-SALT";

/// Nonce size for ChaCha20Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Errors from sealing or opening payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymmetricError {
    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Encryption failed")]
    SealFailed,

    #[error("Decryption failed: wrong key or tampered payload")]
    OpenFailed,

    #[error("Sealed payload too short: {0} bytes")]
    TooShort(usize),
}

/// AEAD cipher bound to one group value.
pub struct GroupCipher {
    cipher: ChaCha20Poly1305,
}

impl GroupCipher {
    /// Derive the payload key from shared value bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self, SymmetricError> {
        let mut key = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(Some(HKDF_SALT), secret)
            .expand(HKDF_INFO, &mut key[..])
            .map_err(|_| SymmetricError::KeyDerivationFailed)?;
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key[..])),
        })
    }

    /// Encrypt one payload under a fresh nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let body = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SymmetricError::SealFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + body.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend(body);
        Ok(sealed)
    }

    /// Decrypt and authenticate one sealed payload.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SymmetricError::TooShort(sealed.len()));
        }
        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| SymmetricError::OpenFailed)
    }
}

/// One-shot [`GroupCipher::seal`] under `secret`.
pub fn encrypt_symmetric(plaintext: &[u8], secret: &[u8]) -> Result<Vec<u8>, SymmetricError> {
    GroupCipher::from_secret(secret)?.seal(plaintext)
}

/// One-shot [`GroupCipher::open`] under `secret`.
pub fn decrypt_symmetric(sealed: &[u8], secret: &[u8]) -> Result<Vec<u8>, SymmetricError> {
    GroupCipher::from_secret(secret)?.open(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let cipher = GroupCipher::from_secret(&[7u8; 16]).unwrap();
        let sealed = cipher.seal(b"Hello, ring!").unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), b"Hello, ring!");
    }

    #[test]
    fn test_other_group_value_cannot_open() {
        let sealed = encrypt_symmetric(b"Secret data", &[1u8; 16]).unwrap();
        assert_eq!(
            decrypt_symmetric(&sealed, &[2u8; 16]),
            Err(SymmetricError::OpenFailed)
        );
    }

    #[test]
    fn test_empty_payload_is_only_overhead() {
        let sealed = encrypt_symmetric(b"", &[3u8; 16]).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(decrypt_symmetric(&sealed, &[3u8; 16]).unwrap().is_empty());
    }

    #[test]
    fn test_same_plaintext_seals_differently() {
        let cipher = GroupCipher::from_secret(&[9u8; 16]).unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn test_flipped_bit_is_rejected() {
        let cipher = GroupCipher::from_secret(b"group value").unwrap();
        let mut sealed = cipher.seal(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(cipher.open(&sealed), Err(SymmetricError::OpenFailed));
    }

    #[test]
    fn test_truncated_payload() {
        assert_eq!(
            decrypt_symmetric(&[0u8; 10], b"secret"),
            Err(SymmetricError::TooShort(10))
        );
    }
}
