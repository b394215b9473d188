//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Shared primitives and utilities for Tienda services."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
//! Core shared primitives for the Tienda workspace.
//! This crate exposes configuration loading and tracing setup consumed by
//! the module, licensing, and API crates.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, LicenseConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    ModulesConfig, OptionalModuleConfig,
};
pub use logging::{init_cli_tracing, init_tracing, LogFormat, LogRotation};
