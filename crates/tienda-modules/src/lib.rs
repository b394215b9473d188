//! ---
//! tienda_section: "02-module-activation"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Module registry and activation resolution."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Tienda module crate: the catalogue of core and optional business
//! modules, their environment-driven enablement flags, and the resolver
//! that folds both into the set of modules usable right now.

pub mod flags;
pub mod registry;
pub mod resolver;

pub use flags::ModuleFlags;
pub use registry::{ModuleDescriptor, ModuleEntry, ModuleKind, ModuleRegistry, RegistryError};
pub use resolver::{resolve, ActiveModuleSet, Resolution, ResolveError, ResolveIssue};
