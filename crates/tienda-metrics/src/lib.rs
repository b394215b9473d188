//! ---
//! tienda_section: "04-observability"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Metrics collection and export utilities."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tienda_modules::ActiveModuleSet;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Router exposing `/metrics`. Families from the process-wide default
/// registry are appended, so library counters show up alongside `registry`.
pub fn router(registry: SharedRegistry) -> Router {
    Router::new().route(
        "/metrics",
        get(move || metrics_handler(registry.clone())),
    )
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = router(registry);

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;
    let addr = listener.local_addr().unwrap_or(addr);

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let mut families = registry.gather();
    families.extend(prometheus::gather());
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the `tiendad` process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
    license_valid: IntGauge,
    license_fallback: IntGauge,
    module_active: IntGaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "tiendad_starts_total",
            "Total number of times the Tienda daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tiendad_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "tiendad_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        let license_valid = IntGauge::with_opts(Opts::new(
            "tienda_license_valid",
            "Indicator (0/1) whether the current license is active and unexpired",
        ))?;
        registry.register(Box::new(license_valid.clone()))?;

        let license_fallback = IntGauge::with_opts(Opts::new(
            "tienda_license_fallback",
            "Indicator (0/1) whether the default license is in effect",
        ))?;
        registry.register(Box::new(license_fallback.clone()))?;

        let module_active = IntGaugeVec::new(
            Opts::new(
                "tienda_module_active",
                "Indicator (0/1) whether a module resolved active",
            ),
            &["module"],
        )?;
        registry.register(Box::new(module_active.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
            license_valid,
            license_fallback,
            module_active,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }

    pub fn set_license_state(&self, valid: bool, fallback: bool) {
        self.license_valid.set(i64::from(valid));
        self.license_fallback.set(i64::from(fallback));
    }

    pub fn set_active_modules(&self, active: &ActiveModuleSet) {
        self.module_active.reset();
        for (name, is_active) in active.iter() {
            self.module_active
                .with_label_values(&[name])
                .set(i64::from(is_active));
        }
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tienda_modules::{resolve, ModuleDescriptor, ModuleRegistry};
    use tower::ServiceExt;

    use super::*;

    fn sample_active() -> ActiveModuleSet {
        let registry = ModuleRegistry::new(
            [ModuleDescriptor::core("sales")],
            [
                ModuleDescriptor::optional("reportes", true, ["sales"]),
                ModuleDescriptor::optional("caja", false, ["sales"]),
            ],
        )
        .unwrap();
        resolve(&registry).active
    }

    #[test]
    fn daemon_metrics_register_with_registry() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.inc_start();
        metrics.observe_config_load(0.01);
        metrics.set_build_info("0.1.0", "debug");
        metrics.set_license_state(true, false);
        metrics.set_active_modules(&sample_active());

        let families = registry.gather();
        let module_family = families
            .iter()
            .find(|family| family.get_name() == "tienda_module_active")
            .unwrap();
        assert_eq!(module_family.get_metric().len(), 3);
        assert!(DaemonMetrics::new(registry).is_err());
    }

    #[test]
    fn module_gauges_drop_modules_no_longer_registered() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.set_active_modules(&sample_active());

        let smaller = ModuleRegistry::new([ModuleDescriptor::core("sales")], []).unwrap();
        metrics.set_active_modules(&resolve(&smaller).active);

        let families = registry.gather();
        let labels: Vec<String> = families
            .iter()
            .find(|family| family.get_name() == "tienda_module_active")
            .unwrap()
            .get_metric()
            .iter()
            .map(|metric| metric.get_label()[0].get_value().to_owned())
            .collect();
        assert_eq!(labels, vec!["sales".to_owned()]);
    }

    #[tokio::test]
    async fn metrics_route_renders_text_exposition() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.set_license_state(false, true);

        let response = router(registry)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("tienda_license_fallback 1"));
    }
}
