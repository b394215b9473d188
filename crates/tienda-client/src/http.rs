//! ---
//! tienda_section: "06-client-mirror"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "HTTP access to the public license endpoint."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::time::Duration;

use tienda_licensing::PublicLicense;
use tracing::debug;
use url::Url;

use crate::error::MirrorError;

/// Path of the public license view, relative to the server base URL.
pub const LICENSE_PATH: &str = "api/license";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin client for `GET /api/license`.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl LicenseClient {
    /// Client for the server at `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, MirrorError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Client with an explicit request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, MirrorError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(LICENSE_PATH)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tienda-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MirrorError::Client)?;
        Ok(Self { http, endpoint })
    }

    /// Resolved license endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch the public license view once.
    pub async fn fetch_license(&self) -> Result<PublicLicense, MirrorError> {
        debug!(endpoint = %self.endpoint, "fetching license");
        let response = self
            .http
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(MirrorError::Request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Status(status.as_u16()));
        }
        response.json().await.map_err(MirrorError::Decode)
    }
}
