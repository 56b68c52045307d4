//! Sync error taxonomy.
//!
//! Four classes with different handling:
//! - decryption failures ([`SyncError::Crypto`]) are fatal to one read and
//!   always surfaced;
//! - transport failures ([`SyncError::Transport`], [`SyncError::Http`])
//!   are recoverable and drive backoff;
//! - authorization failures ([`SyncError::SessionExpired`]) are fatal to
//!   the session and never retried;
//! - validation failures ([`SyncError::MalformedEnvelope`]) are treated as
//!   "no data" by readers.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in workspace sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// 401/403/404 on an owned-resource path. The session is gone; callers
    /// must terminate it rather than retry.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Non-2xx response outside the authorization class.
    #[error("transport error: {0}")]
    Transport(String),

    /// Envelope that cannot be interpreted (e.g. neither ciphertext nor
    /// payload fields). Readers treat this as an absent document.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Unresolvable share token on the public read path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Crypto error (key derivation or payload decryption).
    #[error("crypto error: {0}")]
    Crypto(#[from] vaultsync_crypto::CryptoError),
}

impl SyncError {
    /// True for the unrecoverable authorization class.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, SyncError::SessionExpired(_))
    }

    /// True when a payload failed authenticated decryption.
    pub fn is_decryption(&self) -> bool {
        matches!(
            self,
            SyncError::Crypto(vaultsync_crypto::CryptoError::Decryption(_))
        )
    }
}
