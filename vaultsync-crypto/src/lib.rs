//! Encryption layer for VaultSync.
//!
//! Provides the client-side crypto used by the workspace sync engine:
//! - Argon2id key derivation from the user identifier
//! - AES-256-GCM authenticated encryption of JSON payloads
//! - A compact transport-safe ciphertext string (base64url, no padding)
//!
//! # Key model
//!
//! The remote store never sees key material: every payload is encrypted
//! before upload with a key derived from the owner's identifier against a
//! fixed public salt. Derivation is deterministic, so any client holding
//! the identifier can reconstruct the key, and a key derived from a
//! different identifier can never open the ciphertext (the GCM tag check
//! fails rather than yielding garbage).

mod cipher;
mod error;
mod key;

pub use cipher::{
    decrypt, decrypt_value, encrypt, encrypt_value, MIN_CIPHERTEXT_LEN, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_user_key, derive_user_key_with, DerivedKey, KdfParams, KEY_SIZE};
