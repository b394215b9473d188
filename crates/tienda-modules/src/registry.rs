//! ---
//! tienda_section: "02-module-activation"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Module registry and activation resolution."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tienda_common::config::ModulesConfig;

use crate::flags::ModuleFlags;

/// Modules that are always active and not subject to entitlement checks.
pub const CORE_MODULES: &[&str] = &["auth", "users", "products", "sales"];

/// Built-in optional modules together with their default dependency lists.
pub const OPTIONAL_MODULES: &[(&str, &[&str])] = &[
    ("reportes", &["sales"]),
    ("caja", &["sales", "reportes"]),
    ("devoluciones", &["sales"]),
    ("compras", &["products"]),
    ("delivery", &["sales"]),
    ("asistencia", &["users"]),
    ("vacaciones", &["asistencia"]),
];

/// Static declaration of a single business module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module identifier.
    pub name: String,
    /// Enablement flag read once at load time.
    pub enabled: bool,
    /// True only for core modules, which are active regardless of `enabled`.
    pub required: bool,
    /// Names of modules that must be active for this one to be active.
    pub dependencies: Vec<String>,
}

impl ModuleDescriptor {
    /// Describe a core module.
    #[must_use]
    pub fn core(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            required: true,
            dependencies: Vec::new(),
        }
    }

    /// Describe an optional module.
    #[must_use]
    pub fn optional<I, S>(name: impl Into<String>, enabled: bool, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            enabled,
            required: false,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

/// Whether a module is core or optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Always active.
    Core,
    /// Active only when enabled and all dependencies are active.
    Optional,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Core => f.write_str("core"),
            ModuleKind::Optional => f.write_str("optional"),
        }
    }
}

/// A registry entry; core and optional modules share one name space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEntry {
    /// Always-on module.
    Core(ModuleDescriptor),
    /// Toggleable module.
    Optional(ModuleDescriptor),
}

impl ModuleEntry {
    /// Access the underlying descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        match self {
            ModuleEntry::Core(descriptor) | ModuleEntry::Optional(descriptor) => descriptor,
        }
    }

    /// Kind of the entry.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleEntry::Core(_) => ModuleKind::Core,
            ModuleEntry::Optional(_) => ModuleKind::Optional,
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// Errors raised while assembling a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A module name was empty.
    #[error("module name must not be empty")]
    EmptyName,
    /// The same name appeared twice across core and optional declarations.
    #[error("module '{0}' declared more than once")]
    Duplicate(String),
    /// Configuration tried to redeclare a core module as optional.
    #[error("core module '{0}' cannot be configured as optional")]
    CoreOverride(String),
    /// Core modules never declare dependency edges.
    #[error("core module '{0}' must not declare dependencies")]
    CoreDependencies(String),
}

/// Fixed mapping of every known module, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
    entries: IndexMap<String, ModuleEntry>,
}

impl ModuleRegistry {
    /// Assemble a registry from core and optional declarations.
    ///
    /// `required` is forced to `true` for core entries and `false` for
    /// optional ones.
    pub fn new<C, O>(core: C, optional: O) -> Result<Self, RegistryError>
    where
        C: IntoIterator<Item = ModuleDescriptor>,
        O: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut entries = IndexMap::new();
        for mut descriptor in core {
            if !descriptor.dependencies.is_empty() {
                return Err(RegistryError::CoreDependencies(descriptor.name));
            }
            descriptor.required = true;
            insert_unique(&mut entries, ModuleEntry::Core(descriptor))?;
        }
        for mut descriptor in optional {
            descriptor.required = false;
            insert_unique(&mut entries, ModuleEntry::Optional(descriptor))?;
        }
        Ok(Self { entries })
    }

    /// Build the registry from the built-in catalogue, operator overrides, and flags.
    pub fn from_config(config: &ModulesConfig, flags: &ModuleFlags) -> Result<Self, RegistryError> {
        let mut optional: IndexMap<String, Vec<String>> = OPTIONAL_MODULES
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_owned(),
                    deps.iter().map(|dep| (*dep).to_owned()).collect(),
                )
            })
            .collect();

        for (name, overrides) in &config.optional {
            if CORE_MODULES.contains(&name.as_str()) {
                return Err(RegistryError::CoreOverride(name.clone()));
            }
            let dependencies = optional.entry(name.clone()).or_default();
            if let Some(replacement) = &overrides.dependencies {
                dependencies.clone_from(replacement);
            }
        }

        let core = CORE_MODULES.iter().map(|name| ModuleDescriptor::core(*name));
        let optional = optional.into_iter().map(|(name, dependencies)| {
            let enabled = flags.is_enabled(&name);
            ModuleDescriptor::optional(name, enabled, dependencies)
        });
        Self::new(core, optional)
    }

    /// Names of all optional modules the configuration can produce.
    #[must_use]
    pub fn optional_names(config: &ModulesConfig) -> Vec<String> {
        let mut names: Vec<String> = OPTIONAL_MODULES
            .iter()
            .map(|(name, _)| (*name).to_owned())
            .collect();
        for name in config.optional.keys() {
            if !names.contains(name) && !CORE_MODULES.contains(&name.as_str()) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Lookup an entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.get(name)
    }

    /// Iterate every entry in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.values()
    }

    /// Iterate core descriptors.
    pub fn core(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.values().filter_map(|entry| match entry {
            ModuleEntry::Core(descriptor) => Some(descriptor),
            ModuleEntry::Optional(_) => None,
        })
    }

    /// Iterate optional descriptors.
    pub fn optional(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.values().filter_map(|entry| match entry {
            ModuleEntry::Optional(descriptor) => Some(descriptor),
            ModuleEntry::Core(_) => None,
        })
    }

    /// Iterate module names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no modules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn insert_unique(
    entries: &mut IndexMap<String, ModuleEntry>,
    entry: ModuleEntry,
) -> Result<(), RegistryError> {
    let name = entry.name().to_owned();
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if entries.contains_key(&name) {
        return Err(RegistryError::Duplicate(name));
    }
    entries.insert(name, entry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tienda_common::config::OptionalModuleConfig;

    #[test]
    fn core_entries_are_always_required() {
        let mut sneaky = ModuleDescriptor::core("sales");
        sneaky.required = false;
        sneaky.enabled = false;
        let registry = ModuleRegistry::new([sneaky], Vec::<ModuleDescriptor>::new()).unwrap();
        let entry = registry.get("sales").unwrap();
        assert_eq!(entry.kind(), ModuleKind::Core);
        assert!(entry.descriptor().required);
    }

    #[test]
    fn names_are_unique_across_kinds() {
        let err = ModuleRegistry::new(
            [ModuleDescriptor::core("sales")],
            [ModuleDescriptor::optional("sales", true, Vec::<String>::new())],
        )
        .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("sales".into()));
    }

    #[test]
    fn core_modules_cannot_declare_dependencies() {
        let mut core = ModuleDescriptor::core("sales");
        core.dependencies.push("auth".into());
        let err = ModuleRegistry::new([core], Vec::<ModuleDescriptor>::new()).unwrap_err();
        assert_eq!(err, RegistryError::CoreDependencies("sales".into()));
    }

    #[test]
    fn catalogue_defaults_to_disabled_optionals() {
        let config = ModulesConfig::default();
        let registry = ModuleRegistry::from_config(&config, &ModuleFlags::default()).unwrap();
        assert_eq!(registry.core().count(), CORE_MODULES.len());
        assert_eq!(registry.optional().count(), OPTIONAL_MODULES.len());
        assert!(registry.optional().all(|module| !module.enabled));
        let caja = registry.get("caja").unwrap().descriptor();
        assert_eq!(caja.dependencies, vec!["sales", "reportes"]);
    }

    #[test]
    fn config_replaces_dependencies_and_adds_modules() {
        let mut config = ModulesConfig::default();
        config.optional.insert(
            "caja".into(),
            OptionalModuleConfig {
                enabled: true,
                dependencies: Some(vec!["sales".into()]),
            },
        );
        config.optional.insert(
            "fidelidad".into(),
            OptionalModuleConfig {
                enabled: true,
                dependencies: Some(vec!["sales".into(), "reportes".into()]),
            },
        );
        let flags = ModuleFlags::from_lookup(&config, |_| None);
        let registry = ModuleRegistry::from_config(&config, &flags).unwrap();

        let caja = registry.get("caja").unwrap().descriptor();
        assert!(caja.enabled);
        assert_eq!(caja.dependencies, vec!["sales"]);
        let extra = registry.get("fidelidad").unwrap();
        assert_eq!(extra.kind(), ModuleKind::Optional);
        assert_eq!(registry.names().last(), Some("fidelidad"));
    }

    #[test]
    fn config_cannot_redeclare_core_module() {
        let mut config = ModulesConfig::default();
        config
            .optional
            .insert("sales".into(), OptionalModuleConfig::default());
        let err = ModuleRegistry::from_config(&config, &ModuleFlags::default()).unwrap_err();
        assert_eq!(err, RegistryError::CoreOverride("sales".into()));
    }
}
