//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Shared primitives and utilities for Tienda services."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "TIENDA_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Rotation schedule of the log file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl LogRotation {
    fn appender(self, directory: &Path, file_name: &str) -> RollingFileAppender {
        let rotation = match self {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        };
        RollingFileAppender::new(rotation, directory, file_name)
    }
}

/// Pick the filter directive: `TIENDA_LOG`, then `RUST_LOG`, then the
/// configured level.
fn filter_directive(
    config: &LoggingConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    lookup(LOG_ENV)
        .or_else(|| lookup(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|| config.level.clone())
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let directive = filter_directive(config, |key| std::env::var(key).ok());
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive {directive:?} ({err}); using {}", config.level);
        EnvFilter::new(&config.level)
    })
}

/// File name of the log file for `service_name`.
fn log_file_name(config: &LoggingConfig, service_name: &str) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{prefix}.log")
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

/// Initialize the tracing subscriber from `[logging]`.
///
/// * `TIENDA_LOG` overrides the filter, then `RUST_LOG`, then `logging.level`.
/// * Stdout follows [`LoggingConfig::format`].
/// * With `logging.file` set, JSON lines also go to
///   `<directory>/<file_prefix or service>.log`, rotated per
///   [`LoggingConfig::rotation`].
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = STDOUT_GUARD.set(stdout_guard);

    let file_layer = if config.file {
        std::fs::create_dir_all(&config.directory)?;
        let appender = config
            .rotation
            .appender(&config.directory, &log_file_name(config, service_name));
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(stdout_layer(config.format, stdout_writer))
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        format = ?config.format,
        log_file = config.file,
        log_dir = %config.directory.display(),
        "tracing initialised"
    );
    Ok(())
}

/// Install a stderr-only subscriber for one-shot CLI commands.
pub fn init_cli_tracing() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
