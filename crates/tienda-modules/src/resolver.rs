//! ---
//! tienda_section: "02-module-activation"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Module registry and activation resolution."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::{ModuleDescriptor, ModuleEntry, ModuleRegistry, RegistryError};

/// Modules usable right now, keyed by name in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActiveModuleSet {
    inner: IndexMap<String, bool>,
}

impl ActiveModuleSet {
    /// True when the module exists and resolved active. Unknown names are inactive.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.inner.get(name).copied().unwrap_or(false)
    }

    /// Whether the set has an entry for the name at all.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Iterate `(name, active)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.inner.iter().map(|(name, active)| (name.as_str(), *active))
    }

    /// Names of active modules only.
    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter_map(|(name, active)| active.then_some(name))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Sorted map representation.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.inner
            .iter()
            .map(|(name, active)| (name.clone(), *active))
            .collect()
    }
}

/// Configuration defect found while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveIssue {
    /// A dependency names a module absent from the registry.
    MissingDependency {
        /// Module declaring the dependency.
        module: String,
        /// The unknown name.
        dependency: String,
    },
    /// Dependencies loop back; the path starts and ends with the same module.
    Cycle {
        /// Modules along the cycle.
        path: Vec<String>,
    },
}

impl fmt::Display for ResolveIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveIssue::MissingDependency { module, dependency } => {
                write!(f, "module '{module}' depends on unknown module '{dependency}'")
            }
            ResolveIssue::Cycle { path } => {
                write!(f, "dependency cycle {}", path.join(" -> "))
            }
        }
    }
}

/// Raised by [`Resolution::into_strict`] when the graph has defects.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// One or more issues were reported during resolution.
    #[error("module dependency configuration is invalid: {}", summarise(.0))]
    Invalid(Vec<ResolveIssue>),
    /// The registry itself could not be assembled.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn summarise(issues: &[ResolveIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Entry for every registry name.
    pub active: ActiveModuleSet,
    /// Defects found; affected modules resolve inactive.
    pub issues: Vec<ResolveIssue>,
}

impl Resolution {
    /// True when no configuration defects were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Reject a resolution with issues.
    pub fn into_strict(self) -> Result<ActiveModuleSet, ResolveError> {
        if self.issues.is_empty() {
            Ok(self.active)
        } else {
            Err(ResolveError::Invalid(self.issues))
        }
    }
}

/// Compute the active module set for a registry.
///
/// Core modules are unconditionally active. An optional module is active iff
/// it is enabled and every dependency resolves active, evaluated depth-first
/// with memoisation. Unknown dependencies and cycles fail closed and are
/// reported as issues without stopping resolution of unrelated modules.
#[must_use]
pub fn resolve(registry: &ModuleRegistry) -> Resolution {
    let mut walk = Walk {
        registry,
        memo: HashMap::with_capacity(registry.len()),
        visiting: IndexSet::new(),
        issues: Vec::new(),
    };

    let mut inner = IndexMap::with_capacity(registry.len());
    for name in registry.names() {
        let active = walk.evaluate(name);
        inner.insert(name.to_owned(), active);
    }

    for issue in &walk.issues {
        warn!(issue = %issue, "module configuration defect; affected modules stay inactive");
    }
    let resolution = Resolution {
        active: ActiveModuleSet { inner },
        issues: walk.issues,
    };
    debug!(
        modules = resolution.active.len(),
        active = resolution.active.active_names().count(),
        issues = resolution.issues.len(),
        "module set resolved"
    );
    resolution
}

/// Resolve from separate core and optional declarations.
pub fn resolve_parts<C, O>(core: C, optional: O) -> Result<Resolution, ResolveError>
where
    C: IntoIterator<Item = ModuleDescriptor>,
    O: IntoIterator<Item = ModuleDescriptor>,
{
    let registry = ModuleRegistry::new(core, optional)?;
    Ok(resolve(&registry))
}

struct Walk<'a> {
    registry: &'a ModuleRegistry,
    memo: HashMap<&'a str, bool>,
    visiting: IndexSet<&'a str>,
    issues: Vec<ResolveIssue>,
}

impl<'a> Walk<'a> {
    fn evaluate(&mut self, name: &'a str) -> bool {
        if let Some(active) = self.memo.get(name) {
            return *active;
        }
        let registry = self.registry;
        let descriptor = match registry.get(name) {
            None => return false,
            Some(ModuleEntry::Core(_)) => {
                self.memo.insert(name, true);
                return true;
            }
            Some(ModuleEntry::Optional(descriptor)) => descriptor,
        };

        if let Some(start) = self.visiting.get_index_of(name) {
            let mut path: Vec<String> = self
                .visiting
                .iter()
                .skip(start)
                .map(|module| (*module).to_owned())
                .collect();
            path.push(name.to_owned());
            let cycle = ResolveIssue::Cycle { path };
            if !self.issues.contains(&cycle) {
                self.issues.push(cycle);
            }
            return false;
        }

        self.visiting.insert(&descriptor.name);
        // Walk every edge even after a failure; issues are collected for all of them.
        let mut satisfied = true;
        let dependencies: IndexSet<&'a str> =
            descriptor.dependencies.iter().map(String::as_str).collect();
        for dependency in dependencies {
            if registry.get(dependency).is_none() {
                self.issues.push(ResolveIssue::MissingDependency {
                    module: descriptor.name.clone(),
                    dependency: dependency.to_owned(),
                });
                satisfied = false;
                continue;
            }
            if !self.evaluate(dependency) {
                satisfied = false;
            }
        }
        self.visiting.pop();

        let active = descriptor.enabled && satisfied;
        self.memo.insert(&descriptor.name, active);
        active
    }
}
