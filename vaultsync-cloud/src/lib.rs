//! Client-resident encrypted workspace sync for VaultSync.
//!
//! Keeps a per-user workspace document (and named child documents)
//! consistent with a remote store reachable only through an intermediary
//! HTTP backend. The stored payload is opaque to that backend: every write
//! is encrypted with a key derived from the owner's identifier, every read
//! is decrypted client-side.
//!
//! Pieces:
//! - [`config`]: injected configuration, including the encryption policy
//! - [`sanitize`]: missing-value stripping and remote-name sanitization
//! - [`envelope`]: the versioned wire format (plain / AES-GCM / legacy)
//! - [`client`]: CRUD against the backend with transparent decryption
//! - [`children`]: addressing for named sub-documents
//! - [`listener`]: the adaptive polling loop approximating a push
//!   subscription over a pull transport

pub mod children;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod sanitize;

pub use children::ChildDocuments;
pub use client::{FetchOutcome, RemoteDocumentClient};
pub use config::{EncryptionMode, PollConfig, SyncConfig};
pub use envelope::{Envelope, EnvelopeBuilder, OwnerMetadata};
pub use error::{SyncError, SyncResult};
pub use listener::{
    create_live_listener, AlwaysVisible, EnvironmentSignal, ListenerEvent, ListenerHandle,
    LiveListener,
};
