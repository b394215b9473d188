//! ---
//! tienda_section: "02-module-activation"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Module registry and activation resolution."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use tienda_common::config::ModulesConfig;
use tracing::debug;

use crate::registry::ModuleRegistry;

/// Enablement flags for optional modules, captured once at startup.
///
/// An environment variable `<prefix><NAME>` wins over the TOML flag: only the
/// literal string `"true"` enables, any other value disables. Without the
/// variable the `[modules.optional.<name>] enabled` value applies, and
/// without either the module is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFlags {
    enabled: BTreeMap<String, bool>,
}

impl ModuleFlags {
    /// Read flags from the process environment.
    #[must_use]
    pub fn from_env(config: &ModulesConfig) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Read flags through an arbitrary variable lookup.
    pub fn from_lookup<F>(config: &ModulesConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut enabled = BTreeMap::new();
        for name in ModuleRegistry::optional_names(config) {
            let key = env_key(&config.env_prefix, &name);
            let flag = match lookup(&key) {
                Some(value) => {
                    debug!(module = %name, env = %key, "module flag taken from environment");
                    value == "true"
                }
                None => config
                    .optional
                    .get(&name)
                    .map(|module| module.enabled)
                    .unwrap_or(false),
            };
            enabled.insert(name, flag);
        }
        Self { enabled }
    }

    /// Whether the named optional module is switched on.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(false)
    }

    /// Serialisable view of every flag.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.enabled.clone()
    }
}

/// Environment variable consulted for a module, e.g. `TIENDA_MODULE_CAJA`.
#[must_use]
pub fn env_key(prefix: &str, module: &str) -> String {
    let suffix: String = module
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}{suffix}")
}
