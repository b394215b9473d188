//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Licensing enforcement and entitlement checks."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Tienda licensing crate encapsulating the license format, signed
//! envelope verification, the owned license store, feature limits, the
//! request-time access gate, and associated telemetry.

pub mod certificates;
pub mod core;
pub mod features;
pub mod gate;
pub mod logging;
pub mod store;

pub use crate::core::{License, LicenseError, LicenseTier, PublicLicense};
pub use crate::features::FeatureLimit;
pub use crate::gate::{
    evaluate, evaluate_at, evaluate_capacity, AccessGate, Activation, Denial, DenialCode,
    GateDecision,
};
pub use crate::store::{LicenseOrigin, LicenseSource, LicenseStore, LoadedLicense};
