//! Payload encryption using AES-256-GCM.
//!
//! Ciphertexts are self-contained strings: a fresh random nonce is
//! prepended to the GCM output and the whole buffer is base64url-encoded
//! without padding, so the result is safe inside URLs and JSON strings.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;

/// Size of nonce in bytes (96 bits for AES-GCM).
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Minimum decoded length of a valid ciphertext (nonce + tag, empty body).
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_SIZE + TAG_SIZE;

/// Encrypts plaintext, returning a transport-safe ciphertext string.
///
/// A fresh random nonce is generated per call; two encryptions of the same
/// plaintext under the same key produce different strings.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut bytes = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    bytes.extend_from_slice(&nonce_bytes);
    bytes.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

/// Decrypts a ciphertext string produced by [`encrypt`].
///
/// Fails with [`CryptoError::Decryption`] on undersized input, on invalid
/// encoding, and on authentication failure (wrong key or tampered data).
pub fn decrypt(key: &DerivedKey, encoded: &str) -> CryptoResult<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

    if bytes.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::Decryption(format!(
            "ciphertext too short: {} bytes, minimum {MIN_CIPHERTEXT_LEN}",
            bytes.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);

    cipher.decrypt(nonce, &bytes[NONCE_SIZE..]).map_err(|_| {
        CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
    })
}

/// Encrypts a JSON value.
pub fn encrypt_value(key: &DerivedKey, value: &Value) -> CryptoResult<String> {
    let plaintext = serde_json::to_vec(value)?;
    encrypt(key, &plaintext)
}

/// Decrypts a ciphertext string back into a JSON value.
pub fn decrypt_value(key: &DerivedKey, encoded: &str) -> CryptoResult<Value> {
    let plaintext = decrypt(key, encoded)?;
    Ok(serde_json::from_slice(&plaintext)?)
}
