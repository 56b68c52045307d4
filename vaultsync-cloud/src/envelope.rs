//! The versioned envelope format persisted for one document.
//!
//! An envelope carries either the plaintext payload or a ciphertext
//! string, plus ownership metadata that always stays in the clear so the
//! backend and the polling layer can index and dedup without decrypting.
//! Three formats exist on the wire and are decoded by exhaustive match:
//!
//! - `Encrypted`: `encryptedPayload` + `encryptionType: "AES-GCM"`
//! - `Plain`: sanitized payload fields merged into the envelope itself
//! - `Legacy`: `encryptedPayload` without `encryptionType` — documents
//!   written before authenticated encryption was introduced, stored as
//!   plain base64 of the JSON. Readers accept it; writers never produce it.

use crate::config::EncryptionMode;
use crate::error::{SyncError, SyncResult};
use crate::sanitize::sanitize;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vaultsync_crypto::DerivedKey;

/// Cipher marker written by current clients.
pub const ENCRYPTION_TYPE_AES_GCM: &str = "AES-GCM";

const MODE_ENCRYPTED: &str = "encrypted";
const MODE_PLAIN: &str = "plain";

/// Payload fields consulted for the last-action tag, in priority order.
const LAST_ACTION_FIELDS: [&str; 3] = ["lastAction", "activeSection", "status"];

/// Last-action tag when no conventional field is present.
pub const DEFAULT_LAST_ACTION: &str = "workspace-update";

/// Ownership and audit fields, always stored in the clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerMetadata {
    /// The identifier the encryption key was derived from for this write.
    pub user_key: String,
    /// Reversible encoding of the identifier, used as the remote path
    /// segment and in logs. Obfuscation only, not a security boundary.
    pub encrypted_user_key: String,
    pub updated_at: DateTime<Utc>,
}

/// Clear fields shared by the plain and encrypted formats.
#[derive(Clone, Debug)]
pub struct ClearMeta {
    pub metadata: OwnerMetadata,
    pub last_action: String,
    pub updated_at: DateTime<Utc>,
}

/// One persisted document version.
#[derive(Clone, Debug)]
pub enum Envelope {
    /// Sanitized payload stored in the clear, fields merged at top level.
    Plain {
        fields: Map<String, Value>,
        meta: ClearMeta,
    },
    /// AES-GCM ciphertext of the full stamped document.
    Encrypted { ciphertext: String, meta: ClearMeta },
    /// Pre-encryption weak encoding (base64 of the JSON document).
    Legacy { encoded: String },
}

/// Encodes a user identifier as a path- and log-safe token.
pub fn obfuscate_user_key(identifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(identifier.as_bytes())
}

/// Reverses [`obfuscate_user_key`].
pub fn deobfuscate_user_key(token: &str) -> SyncResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| SyncError::MalformedEnvelope(format!("invalid user key token: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| SyncError::MalformedEnvelope(format!("invalid user key token: {e}")))
}

fn last_action_for(fields: &Map<String, Value>) -> String {
    LAST_ACTION_FIELDS
        .iter()
        .find_map(|name| fields.get(*name).and_then(Value::as_str))
        .unwrap_or(DEFAULT_LAST_ACTION)
        .to_string()
}

/// Assembles the full stamped document: payload fields plus the clear
/// metadata. This is what gets encrypted, and what [`Envelope::open`]
/// returns for every format.
fn assemble_full(fields: &Map<String, Value>, meta: &ClearMeta) -> SyncResult<Value> {
    let mut obj = fields.clone();
    obj.insert("metadata".into(), serde_json::to_value(&meta.metadata)?);
    obj.insert("lastAction".into(), Value::String(meta.last_action.clone()));
    obj.insert("updatedAt".into(), serde_json::to_value(meta.updated_at)?);
    Ok(Value::Object(obj))
}

/// Builds envelopes under a fixed encryption policy.
#[derive(Clone, Debug)]
pub struct EnvelopeBuilder {
    mode: EncryptionMode,
}

impl EnvelopeBuilder {
    pub fn new(mode: EncryptionMode) -> Self {
        Self { mode }
    }

    /// Wraps a payload for storage: sanitize, derive the last-action tag,
    /// stamp metadata with the current time, then encrypt or pass through
    /// per policy.
    pub fn build(&self, user_id: &str, key: &DerivedKey, payload: &Value) -> SyncResult<Envelope> {
        let sanitized = sanitize(payload);
        let Value::Object(fields) = sanitized else {
            return Err(SyncError::MalformedEnvelope(
                "workspace payload must be a JSON object".to_string(),
            ));
        };

        let now = Utc::now();
        let meta = ClearMeta {
            metadata: OwnerMetadata {
                user_key: user_id.to_string(),
                encrypted_user_key: obfuscate_user_key(user_id),
                updated_at: now,
            },
            last_action: last_action_for(&fields),
            updated_at: now,
        };

        match self.mode {
            EncryptionMode::Plain => Ok(Envelope::Plain { fields, meta }),
            EncryptionMode::Encrypted => {
                let stamped = assemble_full(&fields, &meta)?;
                let ciphertext = vaultsync_crypto::encrypt_value(key, &stamped)?;
                Ok(Envelope::Encrypted { ciphertext, meta })
            }
        }
    }
}

impl Envelope {
    /// Classifies a wire value into one of the three formats.
    pub fn from_value(value: Value) -> SyncResult<Envelope> {
        let Value::Object(mut obj) = value else {
            return Err(SyncError::MalformedEnvelope(
                "envelope must be a JSON object".to_string(),
            ));
        };

        match obj.get("encryptedPayload") {
            Some(Value::String(_)) => {
                let is_aes_gcm = obj.get("encryptionType").and_then(Value::as_str)
                    == Some(ENCRYPTION_TYPE_AES_GCM);
                let Some(Value::String(encoded)) = obj.remove("encryptedPayload") else {
                    unreachable!("checked above");
                };
                if is_aes_gcm {
                    let meta = parse_clear_meta(&obj)?;
                    Ok(Envelope::Encrypted {
                        ciphertext: encoded,
                        meta,
                    })
                } else {
                    // No cipher marker: the pre-encryption format.
                    Ok(Envelope::Legacy { encoded })
                }
            }
            Some(_) => Err(SyncError::MalformedEnvelope(
                "encryptedPayload must be a string".to_string(),
            )),
            None => {
                if !obj.contains_key("metadata") {
                    return Err(SyncError::MalformedEnvelope(
                        "missing both encryptedPayload and payload fields".to_string(),
                    ));
                }
                let meta = parse_clear_meta(&obj)?;
                for key in [
                    "metadata",
                    "lastAction",
                    "updatedAt",
                    "encryptionMode",
                    "encryptionType",
                ] {
                    obj.remove(key);
                }
                Ok(Envelope::Plain { fields: obj, meta })
            }
        }
    }

    /// Serializes to the wire format.
    pub fn to_value(&self) -> SyncResult<Value> {
        match self {
            Envelope::Encrypted { ciphertext, meta } => {
                let mut obj = Map::new();
                obj.insert(
                    "encryptedPayload".into(),
                    Value::String(ciphertext.clone()),
                );
                insert_clear_fields(&mut obj, meta)?;
                obj.insert("encryptionMode".into(), MODE_ENCRYPTED.into());
                obj.insert("encryptionType".into(), ENCRYPTION_TYPE_AES_GCM.into());
                Ok(Value::Object(obj))
            }
            Envelope::Plain { fields, meta } => {
                let mut obj = fields.clone();
                insert_clear_fields(&mut obj, meta)?;
                obj.insert("encryptionMode".into(), MODE_PLAIN.into());
                Ok(Value::Object(obj))
            }
            // Never written by current clients; kept for exhaustiveness.
            Envelope::Legacy { encoded } => Ok(serde_json::json!({
                "encryptedPayload": encoded,
            })),
        }
    }

    /// Returns the full stamped document, decrypting if needed.
    ///
    /// A key derived from a different identifier fails with a decryption
    /// error; it can never silently yield another user's document.
    pub fn open(&self, key: &DerivedKey) -> SyncResult<Value> {
        match self {
            Envelope::Encrypted { ciphertext, .. } => {
                Ok(vaultsync_crypto::decrypt_value(key, ciphertext)?)
            }
            Envelope::Plain { fields, meta } => assemble_full(fields, meta),
            Envelope::Legacy { encoded } => legacy_decode(encoded),
        }
    }

    /// Clear metadata, when the format carries it.
    pub fn meta(&self) -> Option<&ClearMeta> {
        match self {
            Envelope::Plain { meta, .. } | Envelope::Encrypted { meta, .. } => Some(meta),
            Envelope::Legacy { .. } => None,
        }
    }
}

fn insert_clear_fields(obj: &mut Map<String, Value>, meta: &ClearMeta) -> SyncResult<()> {
    obj.insert("metadata".into(), serde_json::to_value(&meta.metadata)?);
    obj.insert("lastAction".into(), Value::String(meta.last_action.clone()));
    obj.insert("updatedAt".into(), serde_json::to_value(meta.updated_at)?);
    Ok(())
}

fn parse_clear_meta(obj: &Map<String, Value>) -> SyncResult<ClearMeta> {
    let metadata: OwnerMetadata = obj
        .get("metadata")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| SyncError::MalformedEnvelope(format!("invalid metadata: {e}")))?
        .ok_or_else(|| SyncError::MalformedEnvelope("missing metadata".to_string()))?;

    let last_action = obj
        .get("lastAction")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_LAST_ACTION)
        .to_string();

    let updated_at = obj
        .get("updatedAt")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(metadata.updated_at);

    Ok(ClearMeta {
        metadata,
        last_action,
        updated_at,
    })
}

fn legacy_decode(encoded: &str) -> SyncResult<Value> {
    let bytes = STANDARD.decode(encoded).map_err(|e| {
        SyncError::MalformedEnvelope(format!("legacy payload is not valid base64: {e}"))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        SyncError::MalformedEnvelope(format!("legacy payload is not valid JSON: {e}"))
    })
}
