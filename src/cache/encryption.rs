//! AEAD encryption for credentials persisted to L2/L3.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{ProxyWhirlError, Result};

const NONCE_LEN: usize = 12;

/// Wraps a 32-byte key used to encrypt credential fields before they leave
/// process memory. Never logged, never cloned into `Debug` output.
pub struct CacheCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CacheCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCipher").finish_non_exhaustive()
    }
}

impl CacheCipher {
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Self { cipher: Aes256Gcm::new(key) }
    }

    /// Encrypt `plaintext`, returning a URL-safe base64 string of nonce||ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext.as_bytes()).map_err(|e| {
            ProxyWhirlError::ValidationError { message: format!("cache encryption failed: {e}") }
        })?;
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Decrypt a value previously produced by [`encrypt`]. Returns `None` if
    /// the key doesn't match (authentication failure) rather than an error,
    /// since a wrong key on a cache entry is expected after key rotation.
    pub fn decrypt(&self, encoded: &str) -> Option<String> {
        let combined = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        if combined.len() < NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let cipher = CacheCipher::new(&[7u8; 32]);
        let encrypted = cipher.encrypt("hunter2").unwrap();
        assert!(!encrypted.contains("hunter2"));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "hunter2");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher_a = CacheCipher::new(&[1u8; 32]);
        let cipher_b = CacheCipher::new(&[2u8; 32]);
        let encrypted = cipher_a.encrypt("secret").unwrap();
        assert!(cipher_b.decrypt(&encrypted).is_none());
    }
}
