//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Licensing enforcement and entitlement checks."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::convert::TryInto;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{License, LicenseError};

/// Envelope format version understood by this crate.
pub const ENVELOPE_VERSION: u32 = 1;

/// Signed wrapper around a license payload.
///
/// The signature covers the compact JSON serialisation of `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// License document as issued.
    pub payload: Value,
    /// Base64 encoded ed25519 signature.
    pub signature: String,
}

/// Decode a base64 encoded ed25519 public key.
pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, LicenseError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| LicenseError::PublicKey(format!("not base64: {err}")))?;
    let array: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| LicenseError::PublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&array).map_err(|err| LicenseError::PublicKey(err.to_string()))
}

/// Verify an envelope signature against the given key.
pub fn verify_envelope(envelope: &LicenseEnvelope, key: &VerifyingKey) -> Result<(), LicenseError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(LicenseError::Signature(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    let signature_bytes = general_purpose::STANDARD
        .decode(envelope.signature.trim())
        .map_err(|err| LicenseError::Signature(format!("signature must be base64: {err}")))?;
    let signature_array: [u8; 64] = signature_bytes
        .as_slice()
        .try_into()
        .map_err(|_| LicenseError::Signature("invalid signature length".to_owned()))?;
    let signature = Signature::from_bytes(&signature_array);
    let payload = serde_json::to_vec(&envelope.payload)?;

    key.verify_strict(&payload, &signature)
        .map_err(|err| LicenseError::Signature(err.to_string()))
}

/// Sign a license, producing an envelope suitable for distribution.
pub fn sign_license(license: &License, key: &SigningKey) -> Result<LicenseEnvelope, LicenseError> {
    let payload = serde_json::to_value(license)?;
    let bytes = serde_json::to_vec(&payload)?;
    let signature = key.sign(&bytes);
    Ok(LicenseEnvelope {
        version: ENVELOPE_VERSION,
        payload,
        signature: general_purpose::STANDARD.encode(signature.to_bytes()),
    })
}

/// Encode an envelope as the base64 text form accepted by [`open_license`].
pub fn encode_envelope(envelope: &LicenseEnvelope) -> Result<String, LicenseError> {
    let json = serde_json::to_vec(envelope)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Turn raw license material into a [`License`].
///
/// Material is either a JSON document or base64 encoded JSON. A document with
/// `payload` and `signature` fields is treated as a signed envelope and must
/// verify against `verifier`. Plain documents are rejected when
/// `require_signature` is set.
pub fn open_license(
    raw: &str,
    verifier: Option<&VerifyingKey>,
    require_signature: bool,
) -> Result<License, LicenseError> {
    let document = decode_material(raw)?;
    let is_envelope = document
        .as_object()
        .map(|object| object.contains_key("payload") && object.contains_key("signature"))
        .unwrap_or(false);

    if is_envelope {
        let envelope: LicenseEnvelope = serde_json::from_value(document)?;
        let key = verifier.ok_or_else(|| {
            LicenseError::PublicKey("signed license present but no public key configured".into())
        })?;
        verify_envelope(&envelope, key)?;
        return Ok(serde_json::from_value(envelope.payload)?);
    }

    if require_signature {
        return Err(LicenseError::Unsigned);
    }
    Ok(serde_json::from_value(document)?)
}

fn decode_material(raw: &str) -> Result<Value, LicenseError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    let bytes = general_purpose::STANDARD.decode(trimmed)?;
    Ok(serde_json::from_slice(&bytes)?)
}
