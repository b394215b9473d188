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
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tienda_modules::{resolve, ActiveModuleSet, ModuleEntry, ModuleRegistry, Resolution};

use crate::core::License;
use crate::logging::record_gate_decision;
use crate::store::LicenseStore;

/// Machine-readable reason for a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    /// License inactive or expired.
    LicenseInvalid,
    /// License valid but the module is not entitled.
    ModuleNotLicensed,
    /// Entitled but not activated in this deployment.
    ModuleInactive,
    /// A counted limit has no room left.
    LimitReached,
}

impl DenialCode {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::LicenseInvalid => "LICENSE_INVALID",
            DenialCode::ModuleNotLicensed => "MODULE_NOT_LICENSED",
            DenialCode::ModuleInactive => "MODULE_INACTIVE",
            DenialCode::LimitReached => "LIMIT_REACHED",
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    /// Reason code.
    pub code: DenialCode,
    /// Module or feature the request targeted. Absent for license-wide denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Denial {
    fn new(code: DenialCode, target: Option<&str>) -> Self {
        Self {
            code,
            target: target.map(str::to_owned),
        }
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        let target = self.target.as_deref().unwrap_or_default();
        match self.code {
            DenialCode::LicenseInvalid => "License is inactive or expired".to_owned(),
            DenialCode::ModuleNotLicensed => {
                format!("Module '{target}' is not included in your license")
            }
            DenialCode::ModuleInactive => {
                format!("Module '{target}' is not enabled on this installation")
            }
            DenialCode::LimitReached => format!("License limit '{target}' has been reached"),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Request may proceed.
    Admit,
    /// Request is rejected.
    Deny(Denial),
}

impl GateDecision {
    /// True for [`GateDecision::Admit`].
    #[must_use]
    pub fn is_admit(&self) -> bool {
        matches!(self, GateDecision::Admit)
    }

    /// The denial, if any.
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            GateDecision::Admit => None,
            GateDecision::Deny(denial) => Some(denial),
        }
    }

    /// Label used for metrics.
    #[must_use]
    pub fn outcome_label(&self) -> &'static str {
        match self {
            GateDecision::Admit => "ADMIT",
            GateDecision::Deny(denial) => denial.code.as_str(),
        }
    }
}

/// License-only decision for a module.
#[must_use]
pub fn evaluate(license: &License, module: &str) -> GateDecision {
    evaluate_at(license, module, Utc::now())
}

/// [`evaluate`] against a supplied clock.
#[must_use]
pub fn evaluate_at(license: &License, module: &str, now: DateTime<Utc>) -> GateDecision {
    if !license.is_valid_at(now) {
        return GateDecision::Deny(Denial::new(DenialCode::LicenseInvalid, None));
    }
    if !license.is_entitled(module) {
        return GateDecision::Deny(Denial::new(DenialCode::ModuleNotLicensed, Some(module)));
    }
    GateDecision::Admit
}

/// Decide whether `current` units leave room under the named limit.
#[must_use]
pub fn evaluate_capacity(license: &License, feature: &str, current: u64) -> GateDecision {
    if !license.is_valid() {
        return GateDecision::Deny(Denial::new(DenialCode::LicenseInvalid, None));
    }
    if !license.has_capacity(feature, current) {
        return GateDecision::Deny(Denial::new(DenialCode::LimitReached, Some(feature)));
    }
    GateDecision::Admit
}

/// Registry together with its resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Modules known to the deployment.
    pub registry: ModuleRegistry,
    /// Resolved activation of `registry`.
    pub resolution: Resolution,
}

impl Activation {
    /// Resolve `registry`.
    #[must_use]
    pub fn resolve(registry: ModuleRegistry) -> Self {
        let resolution = resolve(&registry);
        Self {
            registry,
            resolution,
        }
    }

    /// True when `module` is declared as a core module.
    #[must_use]
    pub fn is_core(&self, module: &str) -> bool {
        matches!(self.registry.get(module), Some(ModuleEntry::Core(_)))
    }

    /// Full decision for `module`: license validity first, then entitlement
    /// and activation. Core modules only need a valid license.
    #[must_use]
    pub fn evaluate_at(&self, license: &License, module: &str, now: DateTime<Utc>) -> GateDecision {
        if self.is_core(module) {
            if !license.is_valid_at(now) {
                return GateDecision::Deny(Denial::new(DenialCode::LicenseInvalid, None));
            }
            return GateDecision::Admit;
        }
        match evaluate_at(license, module, now) {
            GateDecision::Admit if !self.resolution.active.is_active(module) => {
                GateDecision::Deny(Denial::new(DenialCode::ModuleInactive, Some(module)))
            }
            decision => decision,
        }
    }
}

/// Request-time gate combining the license snapshot with the resolved
/// module set.
#[derive(Debug)]
pub struct AccessGate {
    store: Arc<LicenseStore>,
    activation: RwLock<Arc<Activation>>,
}

impl AccessGate {
    /// Resolve the registry and build a gate over the store.
    #[must_use]
    pub fn new(store: Arc<LicenseStore>, registry: ModuleRegistry) -> Self {
        Self::with_activation(store, Activation::resolve(registry))
    }

    /// Build a gate over an already computed activation.
    #[must_use]
    pub fn with_activation(store: Arc<LicenseStore>, activation: Activation) -> Self {
        Self {
            store,
            activation: RwLock::new(Arc::new(activation)),
        }
    }

    /// Decide access to a module now.
    pub fn check(&self, module: &str) -> GateDecision {
        self.check_at(module, Utc::now())
    }

    /// Decide access against a supplied clock. License codes take precedence
    /// over activation.
    pub fn check_at(&self, module: &str, now: DateTime<Utc>) -> GateDecision {
        let license = self.store.current();
        let decision = self.activation().evaluate_at(&license, module, now);
        record_gate_decision(module, &decision);
        decision
    }

    /// Capacity decision over the current license.
    pub fn check_capacity(&self, feature: &str, current: u64) -> GateDecision {
        let decision = evaluate_capacity(&self.store.current(), feature, current);
        record_gate_decision(feature, &decision);
        decision
    }

    /// Resolved activation set.
    #[must_use]
    pub fn active_modules(&self) -> ActiveModuleSet {
        self.activation.read().resolution.active.clone()
    }

    /// Current registry and resolution.
    #[must_use]
    pub fn activation(&self) -> Arc<Activation> {
        Arc::clone(&self.activation.read())
    }

    /// The backing license store.
    #[must_use]
    pub fn store(&self) -> &Arc<LicenseStore> {
        &self.store
    }

    /// Resolve a new registry and swap it in.
    pub fn recompute(&self, registry: ModuleRegistry) -> Arc<Activation> {
        self.install(Activation::resolve(registry))
    }

    /// Swap in an activation computed elsewhere.
    pub fn install(&self, activation: Activation) -> Arc<Activation> {
        let activation = Arc::new(activation);
        *self.activation.write() = Arc::clone(&activation);
        activation
    }
}
