//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Shared primitives and utilities for Tienda services."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tracing_subscriber::filter::EnvFilter;

use crate::logging::{LogFormat, LogRotation};

fn default_env_license_var() -> String {
    "TIENDA_LICENSE".to_owned()
}

fn default_module_env_prefix() -> String {
    "TIENDA_MODULE_".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_file() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Primary configuration object for the Tienda daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and built-in defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "TIENDA_CONFIG";

    /// Load configuration from disk, respecting the `TIENDA_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    ///
    /// An explicit `TIENDA_CONFIG` path must exist. When none of the
    /// candidates exist the built-in defaults are returned instead.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        warn!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using built-in defaults"
        );
        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.license.validate()?;
        self.modules.validate()?;
        self.logging.validate()?;
        self.api.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where the license is read from and how it must be authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_env_license_var")]
    pub env_var: String,
    /// Reject license payloads that are not wrapped in a signed envelope.
    #[serde(default)]
    pub require_signature: bool,
    /// Base64 encoded ed25519 public key used to verify signed envelopes.
    #[serde(default)]
    pub public_key: Option<String>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            path: None,
            env_var: default_env_license_var(),
            require_signature: false,
            public_key: None,
        }
    }
}

impl LicenseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.env_var.trim().is_empty() {
            return Err(anyhow!("license.env_var must not be empty"));
        }
        if self.require_signature && self.public_key.is_none() {
            return Err(anyhow!(
                "license.require_signature is set but no license.public_key is configured"
            ));
        }
        Ok(())
    }
}

/// Operator overrides for the optional business modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Refuse to start when the dependency graph has missing references or cycles.
    #[serde(default)]
    pub strict: bool,
    /// Prefix of the per-module enablement variables, e.g. `TIENDA_MODULE_CAJA`.
    #[serde(default = "default_module_env_prefix")]
    pub env_prefix: String,
    #[serde(default)]
    pub optional: IndexMap<String, OptionalModuleConfig>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            strict: false,
            env_prefix: default_module_env_prefix(),
            optional: IndexMap::new(),
        }
    }
}

impl ModulesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.env_prefix.trim().is_empty() {
            return Err(anyhow!("modules.env_prefix must not be empty"));
        }
        for (name, module) in &self.optional {
            validate_module_name(name)?;
            if let Some(dependencies) = &module.dependencies {
                for dependency in dependencies {
                    validate_module_name(dependency).with_context(|| {
                        format!("module '{name}' declares an invalid dependency")
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Per-module table under `[modules.optional.<name>]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OptionalModuleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Replaces the built-in dependency list when present.
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
}

fn validate_module_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("module names must not be empty"));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
    {
        return Err(anyhow!(
            "module name '{name}' must only contain lowercase letters, digits, '_' or '-'"
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `TIENDA_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write JSON lines to a file under `directory`.
    #[serde(default = "default_log_file")]
    pub file: bool,
    #[serde(default)]
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
            file: default_log_file(),
            rotation: LogRotation::default(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level)
            .with_context(|| format!("logging.level {:?} is not a valid filter", self.level))?;
        if let Some(prefix) = &self.file_prefix {
            if prefix.trim().is_empty() || prefix.contains(['/', '\\']) {
                return Err(anyhow!("logging.file_prefix must be a plain, non-empty file name"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// Directory with the built dashboard assets served at `/`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            static_dir: None,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            if let Some(dir) = &self.static_dir {
                if !dir.is_dir() {
                    return Err(anyhow!(
                        "api static_dir {} does not exist or is not a directory",
                        dir.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().expect("defaults are valid");
        assert_eq!(config.license.env_var, "TIENDA_LICENSE");
        assert_eq!(config.modules.env_prefix, "TIENDA_MODULE_");
        assert!(config.modules.optional.is_empty());
        assert!(!config.modules.strict);
    }

    #[test]
    fn module_overrides_keep_declaration_order() {
        let config: AppConfig = r#"
            [modules]
            strict = true

            [modules.optional.reportes]
            enabled = true

            [modules.optional.caja]
            enabled = true
            dependencies = ["sales", "reportes"]
        "#
        .parse()
        .expect("valid config");

        let names: Vec<_> = config.modules.optional.keys().cloned().collect();
        assert_eq!(names, vec!["reportes", "caja"]);
        assert_eq!(
            config.modules.optional["caja"].dependencies.as_deref(),
            Some(&["sales".to_owned(), "reportes".to_owned()][..])
        );
        assert!(config.modules.optional["reportes"].dependencies.is_none());
    }

    #[test]
    fn rejects_uppercase_module_names() {
        let err = r#"
            [modules.optional.Caja]
            enabled = true
        "#
        .parse::<AppConfig>()
        .expect_err("uppercase names are rejected");
        assert!(err.to_string().contains("Caja"));
    }

    #[test]
    fn logging_section_shapes_output() {
        let config: AppConfig = r#"
            [logging]
            level = "warn,tienda_api=debug"
            file = false
            rotation = "hourly"
            file_prefix = "caja-norte"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.logging.level, "warn,tienda_api=debug");
        assert!(!config.logging.file);
        assert_eq!(config.logging.rotation, LogRotation::Hourly);

        let defaults = LoggingConfig::default();
        assert!(defaults.file);
        assert_eq!(defaults.rotation, LogRotation::Daily);
    }

    #[test]
    fn rejects_bad_log_level_and_prefix() {
        assert!("[logging]\nlevel = \"tienda_api=loud\"\n".parse::<AppConfig>().is_err());
        assert!("[logging]\nfile_prefix = \"logs/tienda\"\n"
            .parse::<AppConfig>()
            .is_err());
    }

    #[test]
    fn signature_requirement_needs_public_key() {
        let err = r#"
            [license]
            require_signature = true
        "#
        .parse::<AppConfig>()
        .expect_err("missing key is rejected");
        assert!(err.to_string().contains("public_key"));
    }
}
