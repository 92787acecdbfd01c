// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Vault Value Sealing (AES-256-GCM)
//!
//! Every value persisted by the vault is sealed with AES-256-GCM under a
//! key that lives in platform secure storage. The IV is freshly random for
//! every call.
//!
//! Encoded format: `base64(iv (12 bytes) || ']' || ciphertext || tag (16 bytes))`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

/// Encryption error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Malformed sealed value: {0}")]
    Malformed(String),
    #[error("Key generation failed")]
    KeyGenerationFailed,
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// IV size for AES-256-GCM (96 bits = 12 bytes).
pub const IV_SIZE: usize = 12;
/// Byte placed between the IV and the ciphertext.
pub const IV_SEPARATOR: u8 = b']';
/// Authentication tag size.
const TAG_SIZE: usize = 16;

/// 256-bit key used to seal vault values.
#[derive(Clone)]
pub struct VaultKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl VaultKey {
    /// Generates a new random key.
    pub fn generate() -> Result<Self, EncryptionError> {
        let rng = SystemRandom::new();
        let bytes = ring::rand::generate::<[u8; 32]>(&rng)
            .map_err(|_| EncryptionError::KeyGenerationFailed)?
            .expose();
        Ok(VaultKey { bytes })
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        VaultKey { bytes }
    }

    /// Creates a key from a slice loaded out of a key store.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength(bytes.len()))?;
        Ok(VaultKey { bytes: array })
    }

    /// Returns a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Seals `plaintext` and returns the base64 encoded value.
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<String, EncryptionError> {
    let rng = SystemRandom::new();

    let mut iv = [0u8; IV_SIZE];
    rng.fill(&mut iv)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(IV_SIZE + 1 + in_out.len());
    output.extend_from_slice(&iv);
    output.push(IV_SEPARATOR);
    output.extend_from_slice(&in_out);

    Ok(STANDARD.encode(output))
}

/// Opens a value produced by [`seal`].
pub fn open(key: &VaultKey, encoded: &str) -> Result<Vec<u8>, EncryptionError> {
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| EncryptionError::Malformed(e.to_string()))?;

    if data.len() < IV_SIZE + 1 + TAG_SIZE {
        return Err(EncryptionError::Malformed("value too short".into()));
    }
    if data[IV_SIZE] != IV_SEPARATOR {
        return Err(EncryptionError::Malformed("missing IV separator".into()));
    }

    let iv: [u8; IV_SIZE] = data[..IV_SIZE]
        .try_into()
        .map_err(|_| EncryptionError::DecryptionFailed)?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| EncryptionError::DecryptionFailed)?;
    let opening_key = LessSafeKey::new(unbound_key);

    let mut buffer = data[IV_SIZE + 1..].to_vec();
    let plaintext = opening_key
        .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut buffer)
        .map_err(|_| EncryptionError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}
