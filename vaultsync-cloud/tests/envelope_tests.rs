use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde_json::json;
use vaultsync_cloud::envelope::{deobfuscate_user_key, obfuscate_user_key};
use vaultsync_cloud::sanitize::missing;
use vaultsync_cloud::{Envelope, EnvelopeBuilder, EncryptionMode, SyncError};
use vaultsync_crypto::derive_user_key;

fn encrypted_builder() -> EnvelopeBuilder {
    EnvelopeBuilder::new(EncryptionMode::Encrypted)
}

// --- Building ---

#[test]
fn encrypted_envelope_keeps_payload_out_of_the_clear() {
    let key = derive_user_key("u1").unwrap();
    let envelope = encrypted_builder()
        .build("u1", &key, &json!({ "count": 1 }))
        .unwrap();
    let wire = envelope.to_value().unwrap();

    assert!(wire["encryptedPayload"].is_string());
    assert_eq!(wire["encryptionMode"], "encrypted");
    assert_eq!(wire["encryptionType"], "AES-GCM");
    assert!(wire.get("count").is_none(), "payload leaked: {wire}");
    // Clear metadata is duplicated outside the ciphertext for indexing.
    assert_eq!(wire["metadata"]["userKey"], "u1");
    assert_eq!(wire["metadata"]["encryptedUserKey"], obfuscate_user_key("u1"));
    assert!(wire["updatedAt"].is_string());
    assert_eq!(wire["lastAction"], "workspace-update");
}

#[test]
fn plain_envelope_merges_payload_fields() {
    let key = derive_user_key("u1").unwrap();
    let envelope = EnvelopeBuilder::new(EncryptionMode::Plain)
        .build("u1", &key, &json!({ "count": 1 }))
        .unwrap();
    let wire = envelope.to_value().unwrap();

    assert_eq!(wire["count"], 1);
    assert_eq!(wire["encryptionMode"], "plain");
    assert!(wire.get("encryptedPayload").is_none());
    assert!(wire.get("encryptionType").is_none());
    assert_eq!(wire["metadata"]["userKey"], "u1");
}

#[test]
fn last_action_comes_from_conventional_fields() {
    let key = derive_user_key("u1").unwrap();
    let envelope = encrypted_builder()
        .build("u1", &key, &json!({ "activeSection": "profile" }))
        .unwrap();
    assert_eq!(envelope.to_value().unwrap()["lastAction"], "profile");

    let envelope = encrypted_builder()
        .build("u1", &key, &json!({ "lastAction": "import", "status": "x" }))
        .unwrap();
    assert_eq!(envelope.to_value().unwrap()["lastAction"], "import");
}

#[test]
fn build_sanitizes_missing_values() {
    let key = derive_user_key("u1").unwrap();
    let envelope = encrypted_builder()
        .build("u1", &key, &json!({ "gone": missing(), "kept": true }))
        .unwrap();
    let opened = envelope.open(&key).unwrap();
    assert!(opened.get("gone").is_none());
    assert_eq!(opened["kept"], true);
}

#[test]
fn non_object_payload_is_rejected() {
    let key = derive_user_key("u1").unwrap();
    let result = encrypted_builder().build("u1", &key, &json!([1, 2]));
    assert!(matches!(result, Err(SyncError::MalformedEnvelope(_))));
}

// --- Classification and opening ---

#[test]
fn encrypted_round_trip_through_the_wire_format() {
    let key = derive_user_key("u1").unwrap();
    let envelope = encrypted_builder()
        .build("u1", &key, &json!({ "count": 1 }))
        .unwrap();
    let stamped = envelope.open(&key).unwrap();

    let parsed = Envelope::from_value(envelope.to_value().unwrap()).unwrap();
    assert!(matches!(parsed, Envelope::Encrypted { .. }));
    assert_eq!(parsed.open(&key).unwrap(), stamped);
    assert_eq!(stamped["count"], 1);
    assert_eq!(stamped["metadata"]["userKey"], "u1");
}

#[test]
fn plain_round_trip_through_the_wire_format() {
    let key = derive_user_key("u1").unwrap();
    let envelope = EnvelopeBuilder::new(EncryptionMode::Plain)
        .build("u1", &key, &json!({ "count": 2 }))
        .unwrap();
    let parsed = Envelope::from_value(envelope.to_value().unwrap()).unwrap();
    assert!(matches!(parsed, Envelope::Plain { .. }));
    let opened = parsed.open(&key).unwrap();
    assert_eq!(opened["count"], 2);
    assert_eq!(opened["metadata"]["userKey"], "u1");
}

#[test]
fn cross_user_open_fails_instead_of_yielding_data() {
    let k1 = derive_user_key("u1").unwrap();
    let k2 = derive_user_key("u2").unwrap();
    let envelope = encrypted_builder()
        .build("u1", &k1, &json!({ "count": 1 }))
        .unwrap();
    let err = envelope.open(&k2).unwrap_err();
    assert!(err.is_decryption(), "got {err:?}");
}

#[test]
fn missing_encryption_type_selects_the_legacy_decode() {
    let document = json!({ "count": 7, "lastAction": "old-write" });
    let wire = json!({
        "encryptedPayload": STANDARD.encode(document.to_string()),
    });

    let parsed = Envelope::from_value(wire).unwrap();
    assert!(matches!(parsed, Envelope::Legacy { .. }));

    // Any key works: the legacy format is encoding, not encryption.
    let key = derive_user_key("whoever").unwrap();
    assert_eq!(parsed.open(&key).unwrap(), document);
}

#[test]
fn legacy_garbage_is_malformed_not_a_crash() {
    let wire = json!({ "encryptedPayload": "not base64 at all ***" });
    let parsed = Envelope::from_value(wire).unwrap();
    let key = derive_user_key("u1").unwrap();
    assert!(matches!(
        parsed.open(&key),
        Err(SyncError::MalformedEnvelope(_))
    ));
}

#[test]
fn envelope_with_neither_format_is_malformed() {
    assert!(matches!(
        Envelope::from_value(json!({})),
        Err(SyncError::MalformedEnvelope(_))
    ));
    assert!(matches!(
        Envelope::from_value(json!("just a string")),
        Err(SyncError::MalformedEnvelope(_))
    ));
}

// --- User key obfuscation ---

#[test]
fn user_key_obfuscation_is_reversible() {
    let token = obfuscate_user_key("user@example.com");
    assert_eq!(deobfuscate_user_key(&token).unwrap(), "user@example.com");
}

#[test]
fn obfuscated_key_is_path_safe() {
    let token = obfuscate_user_key("user/with?strange&chars");
    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}
