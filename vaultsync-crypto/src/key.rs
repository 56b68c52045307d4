//! Key derivation from user identifiers.
//!
//! Uses Argon2id with a fixed public salt. The identifier is the only
//! derivation input, so the salt must be constant for the scheme to be
//! deterministic across devices; it is domain-separated, not secret.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Argon2, Params, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for AES-256-GCM).
pub const KEY_SIZE: usize = 32;

/// Fixed public domain salt for user-key derivation.
///
/// The same identifier must yield the same key on every client, or
/// previously written documents become unreadable.
const USER_KEY_SALT: [u8; 16] = *b"vaultsync-usr-v1";

/// A derived encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Creates a derived key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key derivation parameters.
#[derive(Clone, Debug)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    /// Parallelism factor.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP recommendations for Argon2id, fixed for the deployment:
        // changing them changes every derived key.
        Self {
            memory_cost: 19 * 1024, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Derives the encryption key for a user identifier.
///
/// Deterministic: the same identifier always yields the same key, and
/// different identifiers yield computationally unrelated keys.
pub fn derive_user_key(identifier: &str) -> CryptoResult<DerivedKey> {
    derive_user_key_with(identifier, &KdfParams::default())
}

/// Derives a user key with explicit KDF parameters.
pub fn derive_user_key_with(identifier: &str, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(identifier.as_bytes(), &USER_KEY_SALT, &mut key_bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey::from_bytes(key_bytes))
}
