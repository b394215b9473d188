//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "integration-tests"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Signed license loading through the store."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::fs;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::SigningKey;
use tienda_common::LicenseConfig;
use tienda_licensing::certificates::{encode_envelope, sign_license};
use tienda_licensing::{License, LicenseOrigin, LicenseStore};

fn issued() -> License {
    serde_json::from_str(
        r#"{
            "clientId": "c-501",
            "clientName": "Verdulería Las Flores",
            "tier": "enterprise",
            "active": true,
            "modules": {"reportes": true, "caja": true},
            "features": {"maxUsers": 12, "maxStores": 3, "multiStore": true},
            "expiresAt": "2999-01-01"
        }"#,
    )
    .unwrap()
}

fn config(path: std::path::PathBuf, key: &SigningKey) -> LicenseConfig {
    LicenseConfig {
        path: Some(path),
        env_var: "TIENDA_SIGNED_STORE_UNSET".into(),
        require_signature: true,
        public_key: Some(general_purpose::STANDARD.encode(key.verifying_key().to_bytes())),
    }
}

#[test]
fn signed_license_file_is_accepted() {
    let key = SigningKey::from_bytes(&[3u8; 32]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.lic");
    let envelope = sign_license(&issued(), &key).unwrap();
    fs::write(&path, encode_envelope(&envelope).unwrap()).unwrap();

    let store = LicenseStore::open(&config(path.clone(), &key));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.origin, LicenseOrigin::File { path });
    assert_eq!(*snapshot.license, issued());
    assert_eq!(snapshot.license.max_stores(), Some(3));
    assert!(snapshot.license.is_module_enabled("caja"));
}

#[test]
fn tampered_license_falls_back_to_default() {
    let key = SigningKey::from_bytes(&[3u8; 32]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.json");
    let mut envelope = sign_license(&issued(), &key).unwrap();
    envelope.payload["tier"] = serde_json::Value::String("unlimited".into());
    fs::write(&path, serde_json::to_string(&envelope).unwrap()).unwrap();

    let store = LicenseStore::open(&config(path, &key));
    let snapshot = store.snapshot();
    assert_eq!(
        snapshot.origin,
        LicenseOrigin::Fallback {
            reason: "invalid_signature".into()
        }
    );
    assert_eq!(*snapshot.license, License::fallback());
}

#[test]
fn unsigned_license_is_rejected_when_signatures_required() {
    let key = SigningKey::from_bytes(&[3u8; 32]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.json");
    fs::write(&path, serde_json::to_string(&issued()).unwrap()).unwrap();

    let store = LicenseStore::open(&config(path, &key));
    assert_eq!(
        store.snapshot().origin,
        LicenseOrigin::Fallback {
            reason: "unsigned".into()
        }
    );
}
