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

use serde::{Deserialize, Serialize};

/// Maximum number of user accounts.
pub const MAX_USERS: &str = "maxUsers";
/// Maximum number of stores (branches).
pub const MAX_STORES: &str = "maxStores";
/// Whether several stores may be operated from one tenant.
pub const MULTI_STORE: &str = "multiStore";

/// A named limit carried by a license.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureLimit {
    /// On/off switch.
    Flag(bool),
    /// Whole-number ceiling.
    Count(u64),
    /// Any other numeric limit.
    Number(f64),
}

impl FeatureLimit {
    /// Boolean reading of the limit; numbers count as enabled when positive.
    #[must_use]
    pub fn as_flag(&self) -> bool {
        match self {
            FeatureLimit::Flag(flag) => *flag,
            FeatureLimit::Count(count) => *count > 0,
            FeatureLimit::Number(value) => *value > 0.0,
        }
    }

    /// Whole-number reading; flags and negative or fractional numbers yield `None`.
    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            FeatureLimit::Count(count) => Some(*count),
            FeatureLimit::Number(value) if *value >= 0.0 && value.fract() == 0.0 => {
                Some(*value as u64)
            }
            _ => None,
        }
    }

    /// Whether `current` units leave room for one more under this limit.
    #[must_use]
    pub fn has_capacity(&self, current: u64) -> bool {
        match self {
            FeatureLimit::Flag(flag) => *flag,
            FeatureLimit::Count(max) => current < *max,
            FeatureLimit::Number(max) => (current as f64) < *max,
        }
    }
}

/// Limits applied by the built-in default license.
#[must_use]
pub fn default_limits() -> BTreeMap<String, FeatureLimit> {
    BTreeMap::from([
        (MAX_USERS.to_owned(), FeatureLimit::Count(2)),
        (MAX_STORES.to_owned(), FeatureLimit::Count(1)),
        (MULTI_STORE.to_owned(), FeatureLimit::Flag(false)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_parse_by_shape() {
        let parsed: BTreeMap<String, FeatureLimit> =
            serde_json::from_str(r#"{"maxUsers": 10, "multiStore": true, "discount": 2.5}"#)
                .unwrap();
        assert_eq!(parsed["maxUsers"], FeatureLimit::Count(10));
        assert_eq!(parsed["multiStore"], FeatureLimit::Flag(true));
        assert_eq!(parsed["discount"], FeatureLimit::Number(2.5));
    }

    #[test]
    fn capacity_is_exclusive_of_the_ceiling() {
        let limit = FeatureLimit::Count(2);
        assert!(limit.has_capacity(1));
        assert!(!limit.has_capacity(2));
        assert!(!FeatureLimit::Flag(false).has_capacity(0));
        assert!(FeatureLimit::Number(3.5).has_capacity(3));
    }

    #[test]
    fn counts_from_numbers() {
        assert_eq!(FeatureLimit::Number(4.0).as_count(), Some(4));
        assert_eq!(FeatureLimit::Number(-1.0).as_count(), None);
        assert_eq!(FeatureLimit::Flag(true).as_count(), None);
    }
}
