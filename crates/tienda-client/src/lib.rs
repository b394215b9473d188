//! ---
//! tienda_section: "06-client-mirror"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Client-side mirror of the public license view."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Read-only mirror of the license a front end fetches from `tiendad`.
//!
//! The mirror fetches once and never polls. When the fetch fails it holds
//! the same default license the server uses, so both sides deny the same
//! modules.

pub mod error;
pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tienda_licensing::{FeatureLimit, License, LicenseTier};
use tracing::{info, warn};

pub use error::MirrorError;
pub use http::LicenseClient;

/// Where the mirrored license came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorOrigin {
    /// Fetched from a server.
    Remote {
        /// Endpoint that answered.
        endpoint: String,
    },
    /// Supplied by the caller.
    Local,
    /// Default license after a failed fetch.
    Fallback {
        /// Short failure label.
        reason: String,
    },
}

/// License held by the mirror plus its provenance.
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    /// License evaluated locally.
    pub license: License,
    /// Provenance.
    pub origin: MirrorOrigin,
}

/// Client-side license snapshot with pure query helpers.
#[derive(Debug)]
pub struct LicenseMirror {
    snapshot: RwLock<Arc<MirrorSnapshot>>,
}

impl LicenseMirror {
    /// Fetch once from the server at `base_url`, falling back to the default
    /// license on any failure.
    pub async fn fetch(base_url: &str) -> Self {
        match LicenseClient::new(base_url) {
            Ok(client) => Self::fetch_with(&client).await,
            Err(err) => Self::fallback(&err),
        }
    }

    /// Fetch once through an existing client.
    pub async fn fetch_with(client: &LicenseClient) -> Self {
        Self::from_snapshot(load(client).await)
    }

    /// Mirror over a caller-supplied license.
    #[must_use]
    pub fn from_license(license: License) -> Self {
        Self::from_snapshot(MirrorSnapshot {
            license,
            origin: MirrorOrigin::Local,
        })
    }

    fn fallback(err: &MirrorError) -> Self {
        Self::from_snapshot(fallback_snapshot(err))
    }

    fn from_snapshot(snapshot: MirrorSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Explicit re-fetch; swaps the snapshot whatever the outcome.
    pub async fn reload(&self, client: &LicenseClient) -> Arc<MirrorSnapshot> {
        let next = Arc::new(load(client).await);
        *self.snapshot.write() = Arc::clone(&next);
        next
    }

    /// Swap in a license obtained elsewhere.
    pub fn replace(&self, license: License) {
        *self.snapshot.write() = Arc::new(MirrorSnapshot {
            license,
            origin: MirrorOrigin::Local,
        });
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MirrorSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Valid and explicitly entitled to the module.
    #[must_use]
    pub fn is_module_enabled(&self, module: &str) -> bool {
        self.snapshot.read().license.is_module_enabled(module)
    }

    /// Active and not expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.snapshot.read().license.is_valid()
    }

    /// Plan name.
    #[must_use]
    pub fn tier(&self) -> LicenseTier {
        self.snapshot.read().license.tier.clone()
    }

    /// Module entitlements.
    #[must_use]
    pub fn modules(&self) -> BTreeMap<String, bool> {
        self.snapshot.read().license.modules.clone()
    }

    /// Named limits.
    #[must_use]
    pub fn features(&self) -> BTreeMap<String, FeatureLimit> {
        self.snapshot.read().license.features.clone()
    }

    /// Whether `current` units leave room under the named limit.
    #[must_use]
    pub fn has_capacity(&self, feature: &str, current: u64) -> bool {
        self.snapshot.read().license.has_capacity(feature, current)
    }
}

async fn load(client: &LicenseClient) -> MirrorSnapshot {
    match client.fetch_license().await {
        Ok(public) => {
            info!(endpoint = %client.endpoint(), tier = %public.tier, "license mirrored");
            MirrorSnapshot {
                license: public.into_license(),
                origin: MirrorOrigin::Remote {
                    endpoint: client.endpoint().to_string(),
                },
            }
        }
        Err(err) => fallback_snapshot(&err),
    }
}

fn fallback_snapshot(err: &MirrorError) -> MirrorSnapshot {
    warn!(reason = err.reason_label(), error = %err, "license fetch failed; using default basic license");
    MirrorSnapshot {
        license: License::fallback(),
        origin: MirrorOrigin::Fallback {
            reason: err.reason_label().to_owned(),
        },
    }
}
