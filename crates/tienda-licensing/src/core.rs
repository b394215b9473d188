//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Licensing enforcement and entitlement checks."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::features::{self, FeatureLimit};

/// Plan name attached to a license. Open-ended; never matched exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseTier(String);

impl LicenseTier {
    /// The entry-level plan used by the default license.
    pub const BASIC: &'static str = "basic";

    /// Construct a tier from any plan name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `basic` tier.
    #[must_use]
    pub fn basic() -> Self {
        Self::new(Self::BASIC)
    }

    /// Plan name as provided by the issuer.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LicenseTier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Tenant license: entitlements, limits, and validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Opaque tenant identifier. Never exposed publicly.
    pub client_id: String,
    /// Display name of the tenant.
    pub client_name: String,
    /// Plan name.
    pub tier: LicenseTier,
    /// Module entitlements; modules absent here are not entitled.
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,
    /// Named numeric or boolean limits.
    #[serde(default)]
    pub features: BTreeMap<String, FeatureLimit>,
    /// Expiry instant; `None` never expires.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_expiry"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// Master switch.
    pub active: bool,
}

impl License {
    /// Built-in license used whenever the configured source cannot be read.
    ///
    /// Basic tier, active, no module entitlements, low limits. The client
    /// mirror uses the same value on fetch failure.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            client_id: "unlicensed".to_owned(),
            client_name: "Unlicensed".to_owned(),
            tier: LicenseTier::basic(),
            modules: BTreeMap::new(),
            features: features::default_limits(),
            expires_at: None,
            active: true,
        }
    }

    /// True once `expiresAt` has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against a supplied clock.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now,
            None => false,
        }
    }

    /// Active and not expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Validity against a supplied clock.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired_at(now)
    }

    /// Valid and explicitly entitled to the module.
    #[must_use]
    pub fn is_module_enabled(&self, module: &str) -> bool {
        self.is_module_enabled_at(module, Utc::now())
    }

    /// Entitlement check against a supplied clock.
    #[must_use]
    pub fn is_module_enabled_at(&self, module: &str, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && self.is_entitled(module)
    }

    /// Raw entitlement flag, ignoring validity.
    #[must_use]
    pub fn is_entitled(&self, module: &str) -> bool {
        self.modules.get(module).copied().unwrap_or(false)
    }

    /// Lookup a named limit.
    #[must_use]
    pub fn limit(&self, name: &str) -> Option<FeatureLimit> {
        self.features.get(name).copied()
    }

    /// `maxUsers`, when present as a whole number.
    #[must_use]
    pub fn max_users(&self) -> Option<u64> {
        self.limit(features::MAX_USERS)
            .and_then(|limit| limit.as_count())
    }

    /// `maxStores`, when present as a whole number.
    #[must_use]
    pub fn max_stores(&self) -> Option<u64> {
        self.limit(features::MAX_STORES)
            .and_then(|limit| limit.as_count())
    }

    /// `multiStore` flag; absent means single store.
    #[must_use]
    pub fn multi_store(&self) -> bool {
        self.limit(features::MULTI_STORE)
            .map(|limit| limit.as_flag())
            .unwrap_or(false)
    }

    /// Whether `current` units leave room for one more. Absent limits grant nothing.
    #[must_use]
    pub fn has_capacity(&self, name: &str, current: u64) -> bool {
        self.limit(name)
            .map(|limit| limit.has_capacity(current))
            .unwrap_or(false)
    }

    /// Non-sensitive projection served to clients.
    #[must_use]
    pub fn public_view(&self) -> PublicLicense {
        self.public_view_at(Utc::now())
    }

    /// Projection evaluated against a supplied clock.
    #[must_use]
    pub fn public_view_at(&self, now: DateTime<Utc>) -> PublicLicense {
        PublicLicense {
            client_name: self.client_name.clone(),
            tier: self.tier.clone(),
            modules: self.modules.clone(),
            features: self.features.clone(),
            expires_at: self.expires_at,
            active: self.active,
            is_expired: self.is_expired_at(now),
            is_valid: self.is_valid_at(now),
        }
    }
}

/// Public projection of a [`License`]; carries no `clientId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLicense {
    /// Display name of the tenant.
    pub client_name: String,
    /// Plan name.
    pub tier: LicenseTier,
    /// Module entitlements.
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,
    /// Named limits.
    #[serde(default)]
    pub features: BTreeMap<String, FeatureLimit>,
    /// Expiry instant, `null` when the license never expires.
    #[serde(default, deserialize_with = "deserialize_expiry")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Master switch.
    pub active: bool,
    /// Server-side expiry evaluation at serving time.
    pub is_expired: bool,
    /// Server-side validity evaluation at serving time.
    pub is_valid: bool,
}

impl PublicLicense {
    /// Rebuild a license from the projection for local evaluation.
    ///
    /// `clientId` is not part of the projection and comes back empty.
    #[must_use]
    pub fn into_license(self) -> License {
        License {
            client_id: String::new(),
            client_name: self.client_name,
            tier: self.tier,
            modules: self.modules,
            features: self.features,
            expires_at: self.expires_at,
            active: self.active,
        }
    }
}

/// Reasons a license source could not be turned into a [`License`].
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No path was configured and the environment variable is unset.
    #[error("license material missing")]
    Missing,
    /// The license file could not be read.
    #[error("unable to read license file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Material was neither JSON nor base64.
    #[error("license material must be JSON or base64 encoded JSON: {0}")]
    Encoding(#[from] base64::DecodeError),
    /// JSON did not match the license shape.
    #[error("license does not match the expected shape: {0}")]
    Parse(#[from] serde_json::Error),
    /// A signature is required but the payload was unsigned.
    #[error("license signature required but the payload is unsigned")]
    Unsigned,
    /// The configured public key is unusable.
    #[error("invalid license public key: {0}")]
    PublicKey(String),
    /// The envelope signature did not verify.
    #[error("license signature verification failed: {0}")]
    Signature(String),
}

impl LicenseError {
    /// Short stable label for metrics.
    #[must_use]
    pub fn reason_label(&self) -> &'static str {
        match self {
            LicenseError::Missing => "missing",
            LicenseError::Read { .. } => "unreadable",
            LicenseError::Encoding(_) | LicenseError::Parse(_) => "malformed",
            LicenseError::Unsigned => "unsigned",
            LicenseError::PublicKey(_) => "public_key",
            LicenseError::Signature(_) => "invalid_signature",
        }
    }
}

/// Accept RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid expiresAt timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn license(active: bool, expires_at: Option<DateTime<Utc>>) -> License {
        License {
            client_id: "c-001".into(),
            client_name: "Ferretería Central".into(),
            tier: "premium".into(),
            modules: BTreeMap::from([("sales".to_owned(), true), ("caja".to_owned(), false)]),
            features: BTreeMap::new(),
            expires_at,
            active,
        }
    }

    #[test]
    fn inactive_is_invalid_regardless_of_expiry() {
        let now = Utc::now();
        assert!(!license(false, None).is_valid_at(now));
        assert!(!license(false, Some(now + Duration::days(30))).is_valid_at(now));
    }

    #[test]
    fn past_expiry_is_invalid_even_when_active() {
        let now = Utc::now();
        let expired = license(true, Some(now - Duration::days(1)));
        assert!(expired.is_expired_at(now));
        assert!(!expired.is_valid_at(now));
        assert!(!expired.is_module_enabled_at("sales", now));
    }

    #[test]
    fn missing_expiry_never_expires() {
        let far_future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        assert!(!license(true, None).is_expired_at(far_future));
    }

    #[test]
    fn absent_or_false_modules_are_not_entitled() {
        let now = Utc::now();
        let valid = license(true, None);
        assert!(valid.is_module_enabled_at("sales", now));
        assert!(!valid.is_module_enabled_at("caja", now));
        assert!(!valid.is_module_enabled_at("reportes", now));
    }

    #[test]
    fn fallback_is_basic_and_entitles_nothing() {
        let fallback = License::fallback();
        assert_eq!(fallback.tier.as_str(), LicenseTier::BASIC);
        assert!(fallback.is_valid());
        assert!(!fallback.is_module_enabled("sales"));
        assert_eq!(fallback.max_users(), Some(2));
        assert_eq!(fallback.max_stores(), Some(1));
        assert!(!fallback.multi_store());
        assert!(fallback.has_capacity(features::MAX_USERS, 1));
        assert!(!fallback.has_capacity(features::MAX_STORES, 1));
        assert!(!fallback.has_capacity("maxTerminals", 0));
    }

    #[test]
    fn parses_minimal_and_full_documents() {
        let minimal: License = serde_json::from_str(
            r#"{"clientId":"c1","clientName":"Kiosko","tier":"basic","active":true}"#,
        )
        .unwrap();
        assert!(minimal.modules.is_empty());
        assert!(minimal.expires_at.is_none());

        let full: License = serde_json::from_str(
            r#"{
                "clientId": "c2",
                "clientName": "Mini Super",
                "tier": "enterprise-plus",
                "active": true,
                "modules": {"caja": true, "reportes": true},
                "features": {"maxUsers": 25, "multiStore": true},
                "expiresAt": "2027-03-01T12:00:00-03:00"
            }"#,
        )
        .unwrap();
        assert_eq!(full.tier.as_str(), "enterprise-plus");
        assert_eq!(
            full.expires_at,
            Some(Utc.with_ymd_and_hms(2027, 3, 1, 15, 0, 0).unwrap())
        );
        assert_eq!(full.max_users(), Some(25));
        assert!(full.multi_store());
    }

    #[test]
    fn date_only_expiry_is_midnight_utc() {
        let parsed: License = serde_json::from_str(
            r#"{"clientId":"c","clientName":"n","tier":"basic","active":true,"expiresAt":"2026-12-31"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.expires_at,
            Some(Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = serde_json::from_str::<License>(r#"{"clientId":"c","tier":"basic","active":true}"#)
            .unwrap_err();
        assert!(err.to_string().contains("clientName"));
    }

    #[test]
    fn public_view_omits_client_id() {
        let now = Utc::now();
        let view = license(true, Some(now - Duration::hours(1))).public_view_at(now);
        let value = serde_json::to_value(&view).unwrap();
        assert!(value.get("clientId").is_none());
        assert_eq!(value["clientName"], "Ferretería Central");
        assert_eq!(value["isExpired"], true);
        assert_eq!(value["isValid"], false);
        assert!(value.get("expiresAt").is_some());
    }
}
