//! Sync engine configuration.

use serde::{Deserialize, Serialize};

/// Whether payloads are stored encrypted or in the clear.
///
/// Fixed per deployment: all readers and writers must agree, or decryption
/// fails deterministically. Injected at construction rather than read from
/// a process global so multiple configurations can coexist in tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    Encrypted,
    Plain,
}

/// Polling intervals for the live listener, in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Minimum interval between cycles; reset target on any change.
    pub floor_ms: u64,
    /// Maximum interval; both backoff paths clamp here.
    pub ceiling_ms: u64,
    /// Additive growth per unchanged cycle.
    pub step_ms: u64,
    /// Maximum relative jitter applied to every scheduled delay
    /// (0.15 means each delay is scaled by a factor in [0.85, 1.15]).
    pub jitter: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            floor_ms: 5_000,
            ceiling_ms: 60_000,
            step_ms: 5_000,
            jitter: 0.15,
        }
    }
}

/// Configuration for the sync engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the intermediary backend (e.g. "https://api.vaultsync.io").
    pub api_base_url: String,

    /// Remote collection the workspace documents live in.
    pub collection: String,

    /// Process-wide encryption policy for this deployment.
    pub encryption: EncryptionMode,

    /// Listener polling intervals.
    pub poll: PollConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.vaultsync.io".to_string(),
            collection: "workspaces".to_string(),
            encryption: EncryptionMode::Encrypted,
            poll: PollConfig::default(),
        }
    }
}
