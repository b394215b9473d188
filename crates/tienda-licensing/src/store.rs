//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Licensing enforcement and entitlement checks."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use serde::Serialize;
use tienda_common::LicenseConfig;
use tracing::debug;

use crate::certificates::{open_license, parse_public_key};
use crate::core::{License, LicenseError};
use crate::logging::{record_license_fallback, record_license_load};

/// Where the current license came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LicenseOrigin {
    /// Read from a file on disk.
    File {
        /// File that was read.
        path: PathBuf,
    },
    /// Read from an environment variable.
    Environment {
        /// Variable name.
        variable: String,
    },
    /// Provided in-process.
    Static,
    /// Built-in default after a failed load.
    Fallback {
        /// Short failure label.
        reason: String,
    },
}

impl LicenseOrigin {
    /// True when the default license is in effect.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, LicenseOrigin::Fallback { .. })
    }
}

impl fmt::Display for LicenseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseOrigin::File { path } => write!(f, "file:{}", path.display()),
            LicenseOrigin::Environment { variable } => write!(f, "env:{variable}"),
            LicenseOrigin::Static => f.write_str("static"),
            LicenseOrigin::Fallback { reason } => write!(f, "fallback:{reason}"),
        }
    }
}

/// A license together with how and when it was obtained.
#[derive(Debug, Clone)]
pub struct LoadedLicense {
    /// The license in effect.
    pub license: Arc<License>,
    /// Provenance.
    pub origin: LicenseOrigin,
    /// Load instant.
    pub loaded_at: DateTime<Utc>,
}

impl LoadedLicense {
    fn new(license: License, origin: LicenseOrigin) -> Self {
        Self {
            license: Arc::new(license),
            origin,
            loaded_at: Utc::now(),
        }
    }
}

/// Reads license material from the configured file or environment variable.
#[derive(Debug, Clone)]
pub struct LicenseSource {
    path: Option<PathBuf>,
    env_var: String,
    require_signature: bool,
    verifier: Result<Option<VerifyingKey>, String>,
}

impl LicenseSource {
    /// Build a source from configuration. An unusable public key is kept as
    /// an error and surfaces on every read.
    #[must_use]
    pub fn from_config(config: &LicenseConfig) -> Self {
        let verifier = match config.public_key.as_deref() {
            Some(encoded) => parse_public_key(encoded)
                .map(Some)
                .map_err(|err| err.to_string()),
            None => Ok(None),
        };
        Self {
            path: config.path.clone(),
            env_var: config.env_var.clone(),
            require_signature: config.require_signature,
            verifier,
        }
    }

    /// Read and decode the license, surfacing every failure.
    pub fn read(&self) -> Result<(License, LicenseOrigin), LicenseError> {
        let verifier = self
            .verifier
            .as_ref()
            .map_err(|reason| LicenseError::PublicKey(reason.clone()))?
            .as_ref();
        let (raw, origin) = self.material()?;
        let license = open_license(&raw, verifier, self.require_signature)?;
        Ok((license, origin))
    }

    /// Read the license, substituting the default license on any failure.
    #[must_use]
    pub fn load(&self) -> LoadedLicense {
        match self.read() {
            Ok((license, origin)) => {
                record_license_load(&license, &origin.to_string());
                LoadedLicense::new(license, origin)
            }
            Err(err) => {
                record_license_fallback(&err);
                LoadedLicense::new(
                    License::fallback(),
                    LicenseOrigin::Fallback {
                        reason: err.reason_label().to_owned(),
                    },
                )
            }
        }
    }

    fn material(&self) -> Result<(String, LicenseOrigin), LicenseError> {
        if let Some(path) = &self.path {
            if path.exists() {
                debug!(license_path = %path.display(), "loading license file");
                let raw = fs::read_to_string(path).map_err(|source| LicenseError::Read {
                    path: path.clone(),
                    source,
                })?;
                return Ok((raw, LicenseOrigin::File { path: path.clone() }));
            }
            debug!(license_path = %path.display(), "license file absent; trying environment");
        }

        match std::env::var(&self.env_var) {
            Ok(value) if !value.trim().is_empty() => {
                debug!(env = %self.env_var, "loaded license material from environment");
                Ok((
                    value,
                    LicenseOrigin::Environment {
                        variable: self.env_var.clone(),
                    },
                ))
            }
            _ => Err(LicenseError::Missing),
        }
    }
}

/// Owned holder of the current license snapshot.
///
/// Readers clone an `Arc` and never touch the source; only [`reload`]
/// performs I/O.
///
/// [`reload`]: LicenseStore::reload
#[derive(Debug)]
pub struct LicenseStore {
    source: Option<LicenseSource>,
    snapshot: RwLock<Arc<LoadedLicense>>,
}

impl LicenseStore {
    /// Load once from the configured source. Never fails.
    #[must_use]
    pub fn open(config: &LicenseConfig) -> Self {
        let source = LicenseSource::from_config(config);
        let loaded = source.load();
        Self {
            source: Some(source),
            snapshot: RwLock::new(Arc::new(loaded)),
        }
    }

    /// Store pinned to a fixed license; [`reload`](Self::reload) keeps it.
    #[must_use]
    pub fn from_license(license: License) -> Self {
        Self {
            source: None,
            snapshot: RwLock::new(Arc::new(LoadedLicense::new(license, LicenseOrigin::Static))),
        }
    }

    /// Current license.
    #[must_use]
    pub fn current(&self) -> Arc<License> {
        Arc::clone(&self.snapshot.read().license)
    }

    /// Current license with provenance.
    #[must_use]
    pub fn snapshot(&self) -> Arc<LoadedLicense> {
        Arc::clone(&self.snapshot.read())
    }

    /// Re-read the source and swap the snapshot.
    pub fn reload(&self) -> Arc<License> {
        let Some(source) = &self.source else {
            return self.current();
        };
        let loaded = Arc::new(source.load());
        let license = Arc::clone(&loaded.license);
        *self.snapshot.write() = loaded;
        license
    }

    /// Swap in a license without consulting the source.
    pub fn replace(&self, license: License) -> Arc<License> {
        let loaded = Arc::new(LoadedLicense::new(license, LicenseOrigin::Static));
        let license = Arc::clone(&loaded.license);
        *self.snapshot.write() = loaded;
        license
    }
}
