//! Credential vault for agent API keys.
//!
//! Keys are sealed with AES-256-GCM under a process-wide 32-byte key. The
//! stored form is `base64(nonce || ciphertext || tag)` so a row carries
//! everything needed to open it again.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CryptoError;

pub const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Encrypts and decrypts stored agent credentials.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Build a vault from the base64 form of a 32-byte key.
    pub fn from_base64_key(key: &SecretString) -> Result<Self, CryptoError> {
        let raw = STANDARD
            .decode(key.expose_secret().trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_key_bytes(&raw)
    }

    pub fn from_key_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength(raw.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(raw).map_err(|_| CryptoError::InvalidKeyLength(raw.len()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<SecretString, CryptoError> {
        let bytes = STANDARD
            .decode(stored)
            .map_err(|e| CryptoError::Decrypt(format!("invalid base64: {e}")))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(CryptoError::Decrypt("ciphertext too short".to_string()));
        }
        let (nonce, sealed) = bytes.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt("authentication failed".to_string()))?;
        let text = String::from_utf8(plain)
            .map_err(|_| CryptoError::Decrypt("plaintext is not UTF-8".to_string()))?;
        Ok(SecretString::from(text))
    }
}

/// Generate a fresh random key, base64 encoded, suitable for `ENCRYPTION_KEY`.
pub fn generate_key_base64() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::from_base64_key(&SecretString::from(generate_key_base64()))
            .expect("valid key")
    }

    #[test]
    fn encrypt_then_decrypt_recovers_secret() {
        let vault = vault();
        for secret in ["app-abc123", "", "ключ with spaces and ünïcode"] {
            let sealed = vault.encrypt(secret).expect("encrypt");
            assert_ne!(sealed, secret);
            let opened = vault.decrypt(&sealed).expect("decrypt");
            assert_eq!(opened.expose_secret(), secret);
        }
    }

    #[test]
    fn nonces_differ_between_calls() {
        let vault = vault();
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn short_key_is_rejected() {
        let key = SecretString::from(STANDARD.encode([7u8; 16]));
        let err = CredentialVault::from_base64_key(&key).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength(16)));
    }

    #[test]
    fn non_base64_key_is_rejected() {
        let key = SecretString::from("not base64!!".to_string());
        assert!(matches!(
            CredentialVault::from_base64_key(&key),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = vault().encrypt("secret").unwrap();
        assert!(matches!(vault().decrypt(&sealed), Err(CryptoError::Decrypt(_))));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let vault = vault();
        let sealed = vault.encrypt("secret").unwrap();
        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(vault.decrypt(&STANDARD.encode(bytes)).is_err());
    }
}
