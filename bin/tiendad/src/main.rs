//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "binary"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Binary entrypoint for the Tienda daemon."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tienda_api::{spawn_api_server, ApiServer, ApiState};
use tienda_common::config::AppConfig;
use tienda_common::logging::{init_cli_tracing, init_tracing};
use tienda_licensing::{AccessGate, Activation, LicenseStore};
use tienda_metrics::{new_registry, spawn_http_server, DaemonMetrics};
use tienda_modules::{ModuleFlags, ModuleRegistry};
use tokio::signal;
use tracing::{info, warn};

mod inspect;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("Tienda ", env!("CARGO_PKG_VERSION")),
    about = "Tienda module licensing daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the license and module API")]
    Run,
    #[command(about = "Print the loaded license and its validity")]
    License,
    #[command(about = "Print the resolved module set and any configuration issues")]
    Modules,
    #[command(about = "Wrap a license document in a signed envelope")]
    SignLicense(inspect::SignArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let (config, source, load_seconds) = load_config(cli.config, cli.listen)?;
            init_tracing("tiendad", &config.logging)?;
            match &source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("configuration defaults in use"),
            }
            run_daemon(config, load_seconds).await?
        }
        Commands::License => {
            init_cli_tracing();
            let (config, _, _) = load_config(cli.config, cli.listen)?;
            inspect::print_license(&config)?
        }
        Commands::Modules => {
            init_cli_tracing();
            let (config, _, _) = load_config(cli.config, cli.listen)?;
            inspect::print_modules(&config)?
        }
        Commands::SignLicense(args) => {
            init_cli_tracing();
            inspect::sign_license(&args)?
        }
    }
    Ok(())
}

fn load_config(
    explicit: Option<PathBuf>,
    listen: Option<SocketAddr>,
) -> Result<(AppConfig, Option<PathBuf>, f64)> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path);
    }
    candidates.push(PathBuf::from("configs/tienda.toml"));
    candidates.push(PathBuf::from("configs/tienda.example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_seconds = load_started.elapsed().as_secs_f64();
    let mut config = loaded.config;
    if let Some(listen) = listen {
        config.api.listen = listen;
    }
    Ok((config, loaded.source, load_seconds))
}

/// Build the module activation from configuration and environment flags.
///
/// With `modules.strict` any resolution issue aborts.
pub(crate) fn build_activation(config: &AppConfig) -> Result<Activation> {
    let flags = ModuleFlags::from_env(&config.modules);
    let registry = ModuleRegistry::from_config(&config.modules, &flags)
        .context("failed to build module registry")?;
    let activation = Activation::resolve(registry);
    if config.modules.strict {
        activation
            .resolution
            .clone()
            .into_strict()
            .context("modules.strict rejected the module configuration")?;
    }
    Ok(activation)
}

async fn run_daemon(config: AppConfig, config_load_seconds: f64) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let api_settings = config.api.clone();

    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    daemon_metrics.observe_config_load(config_load_seconds);
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(VERSION, build_profile());

    let activation = build_activation(&config)?;
    let store = Arc::new(LicenseStore::open(&config.license));
    let loaded = store.snapshot();
    if loaded.origin.is_fallback() {
        warn!(origin = %loaded.origin, "running with the default basic license");
    }
    let gate = Arc::new(AccessGate::with_activation(store, activation));
    info!(
        tier = %loaded.license.tier,
        valid = loaded.license.is_valid(),
        active = ?gate.active_modules().active_names().collect::<Vec<_>>(),
        "license and modules ready"
    );
    daemon_metrics.set_license_state(loaded.license.is_valid(), loaded.origin.is_fallback());
    daemon_metrics.set_active_modules(&gate.active_modules());

    let metrics_server = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(metrics_registry.clone(), metrics_settings.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let mut api_server: Option<ApiServer> = None;
    if api_settings.enabled {
        let static_dir = api_settings.static_dir.clone().and_then(|dir| {
            if dir.is_dir() {
                Some(dir)
            } else {
                warn!(static_dir = %dir.display(), "api static_dir not found; serving API without assets");
                None
            }
        });
        let state = Arc::new(
            ApiState::new(Arc::clone(&gate), config.modules.clone(), VERSION)
                .with_metrics(daemon_metrics.clone()),
        );
        match spawn_api_server(state, api_settings.listen, static_dir) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    Ok(())
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}
