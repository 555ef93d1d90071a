//! Cryptographic operations for vault security
//!
//! - PBKDF2-HMAC-SHA256 for password-based key derivation
//! - AES-256-GCM for symmetric encryption
//! - Secure memory handling with zeroization
//!
//! The salt is a fixed application-wide constant, so the password is the only
//! secret input to the key. Blobs written by earlier builds depend on it; do
//! not change the salt or the iteration count without versioning the format.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Application-wide PBKDF2 salt
pub const KDF_SALT: &[u8] = b"my-health-pledge-salt";

/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 100_000;

/// Symmetric key derived from the vault password.
///
/// Zeroized on drop. Never serialized and never printed.
pub struct DerivedKey {
    key: Secret<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Derive the vault key from a password.
    ///
    /// Deterministic: the same password always yields the same key, which is
    /// what lets the vault unlock without storing the key. Rejecting empty
    /// passwords is the caller's job.
    pub fn derive(password: &[u8]) -> Self {
        // Scratch buffer is wiped on drop
        let mut output = Zeroizing::new([0u8; KEY_SIZE]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, KDF_SALT, KDF_ITERATIONS, output.as_mut_slice());
        Self {
            key: Secret::new(*output),
        }
    }

    /// Encrypt data using AES-256-GCM under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| VaultError::Consistency(e.to_string()))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| VaultError::Consistency("AES-GCM encryption failed".to_string()))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// Decrypt and authenticate data using AES-256-GCM
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
        let cipher =
            Aes256Gcm::new_from_slice(self.key.expose_secret()).map_err(|_| VaultError::Auth)?;

        let nonce = Nonce::from_slice(nonce);

        cipher.decrypt(nonce, ciphertext).map_err(|_| VaultError::Auth)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_is_deterministic() {
        let keys = DerivedKey::derive(b"test-password-123");
        let keys2 = DerivedKey::derive(b"test-password-123");

        assert_eq!(keys.key.expose_secret(), keys2.key.expose_secret());
    }

    #[test]
    fn test_different_passwords_give_different_keys() {
        let a = DerivedKey::derive(b"password1");
        let b = DerivedKey::derive(b"password2");
        assert_ne!(a.key.expose_secret(), b.key.expose_secret());
    }

    #[test]
    fn test_matches_pbkdf2_reference_parameters() {
        let mut expected = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"pw", b"my-health-pledge-salt", 100_000, &mut expected);

        let key = DerivedKey::derive(b"pw");
        assert_eq!(key.key.expose_secret(), &expected);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let keys = DerivedKey::derive(b"test-password");

        let plaintext = b"Hello, secure world!";
        let (ciphertext, nonce) = keys.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = keys.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_is_auth_error() {
        let keys1 = DerivedKey::derive(b"password1");
        let keys2 = DerivedKey::derive(b"password2");

        let (ciphertext, nonce) = keys1.encrypt(b"Secret data").unwrap();

        let result = keys2.decrypt(&ciphertext, &nonce);
        assert!(matches!(result, Err(VaultError::Auth)));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let nonce1 = generate_nonce();
        let nonce2 = generate_nonce();
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = DerivedKey::derive(b"pw");
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
