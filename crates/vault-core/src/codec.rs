//! Encrypted blob format
//!
//! A blob is the standard base64 encoding of `nonce || ciphertext || tag`,
//! where the ciphertext is AES-256-GCM over the JSON encoding of the payload.
//! This is the only representation of vault data that ever reaches storage.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::crypto::{DerivedKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{VaultError, VaultResult};

/// Text-encoded encrypted payload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wrap an already-encoded blob (e.g. read from storage or a backup file)
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_parts(nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        raw.extend_from_slice(nonce);
        raw.extend_from_slice(ciphertext);
        Self(STANDARD.encode(raw))
    }

    /// Split into nonce and ciphertext. Any malformation is an auth failure.
    fn to_parts(&self) -> VaultResult<([u8; NONCE_SIZE], Vec<u8>)> {
        let raw = STANDARD
            .decode(self.0.trim())
            .map_err(|_| VaultError::Auth)?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::Auth);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&raw[..NONCE_SIZE]);
        Ok((nonce, raw[NONCE_SIZE..].to_vec()))
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} chars)", self.0.len())
    }
}

/// Serialize and encrypt a payload under `key`
pub fn seal<T: Serialize + ?Sized>(key: &DerivedKey, payload: &T) -> VaultResult<EncryptedBlob> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload).map_err(|e| VaultError::Consistency(e.to_string()))?,
    );

    let (ciphertext, nonce) = key.encrypt(&plaintext)?;

    Ok(EncryptedBlob::from_parts(&nonce, &ciphertext))
}

/// Authenticate, decrypt and deserialize a blob
pub fn open<T: DeserializeOwned>(key: &DerivedKey, blob: &EncryptedBlob) -> VaultResult<T> {
    let (nonce, ciphertext) = blob.to_parts()?;

    let plaintext = Zeroizing::new(key.decrypt(&ciphertext, &nonce)?);

    serde_json::from_slice(&plaintext).map_err(|e| VaultError::Consistency(e.to_string()))
}
