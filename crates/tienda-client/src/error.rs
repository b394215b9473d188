//! ---
//! tienda_section: "06-client-mirror"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Client mirror error types."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use thiserror::Error;

/// Failures while fetching the public license view.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The base URL could not be parsed or joined.
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    /// The HTTP client could not be built.
    #[error("unable to construct http client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request did not complete.
    #[error("license request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("license endpoint returned status {0}")]
    Status(u16),
    /// The body was not a public license document.
    #[error("license response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl MirrorError {
    /// Short stable label for logs.
    pub fn reason_label(&self) -> &'static str {
        match self {
            MirrorError::Url(_) | MirrorError::Client(_) => "config",
            MirrorError::Request(_) => "unreachable",
            MirrorError::Status(_) => "status",
            MirrorError::Decode(_) => "malformed",
        }
    }
}
