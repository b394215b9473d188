//! ---
//! tienda_section: "03-licensing-system"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Licensing enforcement and entitlement checks."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use tracing::{debug, info, warn};

use crate::core::{License, LicenseError};
use crate::gate::GateDecision;

static LICENSE_LOADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tienda_license_loads_total",
        "Total number of license loads that succeeded"
    )
    .expect("metric registration to succeed")
});

static LICENSE_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tienda_license_fallbacks_total",
        "Total number of license loads that fell back to the default license",
        &["reason"]
    )
    .expect("metric registration to succeed")
});

static GATE_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tienda_gate_decisions_total",
        "Access gate decisions by outcome code",
        &["outcome"]
    )
    .expect("metric registration to succeed")
});

/// Record a successful license load.
pub fn record_license_load(license: &License, origin: &str) {
    LICENSE_LOADS_TOTAL.inc();
    info!(
        client = %license.client_name,
        tier = %license.tier,
        active = license.active,
        expires_at = ?license.expires_at,
        origin = origin,
        "license accepted"
    );
}

/// Record a fallback to the default license.
pub fn record_license_fallback(error: &LicenseError) {
    LICENSE_FALLBACKS_TOTAL
        .with_label_values(&[error.reason_label()])
        .inc();
    warn!(reason = error.reason_label(), error = %error, "license unavailable; using default basic license");
}

/// Record an access gate decision.
pub fn record_gate_decision(module: &str, decision: &GateDecision) {
    let outcome = decision.outcome_label();
    GATE_DECISIONS_TOTAL.with_label_values(&[outcome]).inc();
    match decision {
        GateDecision::Admit => debug!(module = module, "module access admitted"),
        GateDecision::Deny(denial) => {
            info!(module = module, code = %denial.code, "module access denied")
        }
    }
}
