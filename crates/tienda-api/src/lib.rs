//! ---
//! tienda_section: "05-networking-external-interfaces"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Networking API surface for the license and module views."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---

pub mod guard;

use std::collections::BTreeMap;
use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tienda_common::ModulesConfig;
use tienda_licensing::{
    AccessGate, Activation, FeatureLimit, GateDecision, LicenseOrigin,
    LicenseStore, LicenseTier, PublicLicense,
};
use tienda_metrics::DaemonMetrics;
use tienda_modules::{ModuleFlags, ModuleKind, ModuleRegistry, ResolveIssue};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use guard::{require_module, DenialBody, Forbidden};

/// Shared API state exposed to handlers.
pub struct ApiState {
    gate: Arc<AccessGate>,
    modules: ModulesConfig,
    version: String,
    start: Instant,
    metrics: Option<DaemonMetrics>,
}

impl ApiState {
    pub fn new(gate: Arc<AccessGate>, modules: ModulesConfig, version: impl Into<String>) -> Self {
        Self {
            gate,
            modules,
            version: version.into(),
            start: Instant::now(),
            metrics: None,
        }
    }

    /// Keep daemon gauges in step with reloads.
    #[must_use]
    pub fn with_metrics(mut self, metrics: DaemonMetrics) -> Self {
        self.metrics = Some(metrics);
        self.refresh_metrics();
        self
    }

    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    fn store(&self) -> &Arc<LicenseStore> {
        self.gate.store()
    }

    fn status(&self) -> StatusResponse {
        let loaded = self.store().snapshot();
        let active = self.gate.active_modules();
        StatusResponse {
            version: self.version.clone(),
            uptime_seconds: self.start.elapsed().as_secs(),
            tier: loaded.license.tier.clone(),
            license_valid: loaded.license.is_valid(),
            license_origin: loaded.origin.clone(),
            license_loaded_at: loaded.loaded_at,
            active_modules: active.active_names().map(str::to_owned).collect(),
        }
    }

    fn modules(&self) -> ModulesResponse {
        let activation = self.gate.activation();
        let license = self.store().current();
        let now = Utc::now();
        let modules = activation
            .registry
            .entries()
            .map(|entry| {
                let name = entry.name();
                let active = activation.resolution.active.is_active(name);
                let access = activation.evaluate_at(&license, name, now).outcome_label();
                ModuleStatus {
                    name: name.to_owned(),
                    kind: entry.kind(),
                    enabled: entry.descriptor().enabled,
                    active,
                    licensed: license.is_entitled(name),
                    access,
                    dependencies: entry.descriptor().dependencies.clone(),
                }
            })
            .collect();
        ModulesResponse {
            modules,
            issues: activation.resolution.issues.clone(),
        }
    }

    /// Re-read the license and module flags, then swap both snapshots.
    ///
    /// With `modules.strict` a resolution carrying issues is rejected and the
    /// previous module set stays in place; the license is reloaded either way.
    pub fn reload(&self) -> Result<ReloadResponse> {
        self.store().reload();
        let flags = ModuleFlags::from_env(&self.modules);
        let registry = ModuleRegistry::from_config(&self.modules, &flags)
            .context("failed to rebuild module registry")?;
        let activation = Activation::resolve(registry);
        if self.modules.strict && !activation.resolution.is_clean() {
            self.refresh_metrics();
            let issues = activation
                .resolution
                .issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!("module configuration rejected: {issues}"));
        }
        let activation = self.gate.install(activation);
        self.refresh_metrics();

        let loaded = self.store().snapshot();
        info!(
            origin = %loaded.origin,
            active = activation.resolution.active.active_names().count(),
            "license and module activation reloaded"
        );
        Ok(ReloadResponse {
            origin: loaded.origin.clone(),
            license: loaded.license.public_view(),
            active: activation.resolution.active.to_map(),
            issues: activation.resolution.issues.clone(),
        })
    }

    fn refresh_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            let loaded = self.store().snapshot();
            metrics.set_license_state(loaded.license.is_valid(), loaded.origin.is_fallback());
            metrics.set_active_modules(&self.gate.active_modules());
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("version", &self.version)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Assemble the API router, optionally serving static assets as a fallback.
pub fn router(state: Arc<ApiState>, static_dir: Option<PathBuf>) -> Router {
    let api_routes = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/license", get(get_license))
        .route("/api/license/reload", post(post_reload))
        .route("/api/license/capacity/:feature", get(get_capacity))
        .route("/api/modules", get(get_modules))
        .route("/api/modules/:name/access", get(get_module_access))
        .with_state(state);

    if let Some(dir) = static_dir {
        let service = get_service(ServeDir::new(dir).append_index_html_on_directories(true));
        Router::new()
            .merge(api_routes)
            .fallback_service(service)
            .layer(TraceLayer::new_for_http())
    } else {
        api_routes.layer(TraceLayer::new_for_http())
    }
}

/// Spawn the REST API with optional static asset hosting.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> Result<ApiServer> {
    let router = router(state, static_dir);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;
    let addr = tcp_listener.local_addr().unwrap_or(addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    tier: LicenseTier,
    license_valid: bool,
    license_origin: LicenseOrigin,
    license_loaded_at: DateTime<Utc>,
    active_modules: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModuleStatus {
    name: String,
    kind: ModuleKind,
    enabled: bool,
    active: bool,
    licensed: bool,
    access: &'static str,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ModulesResponse {
    modules: Vec<ModuleStatus>,
    issues: Vec<ResolveIssue>,
}

/// Body of a successful `POST /api/license/reload`.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub origin: LicenseOrigin,
    pub license: PublicLicense,
    pub active: BTreeMap<String, bool>,
    pub issues: Vec<ResolveIssue>,
}

#[derive(Debug, Serialize)]
struct AccessGranted {
    success: bool,
    module: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CapacityGranted {
    success: bool,
    feature: String,
    current: u64,
    limit: Option<FeatureLimit>,
}

#[derive(Debug, Deserialize)]
struct CapacityQuery {
    #[serde(default)]
    current: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            success: false,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn get_license(State(state): State<Arc<ApiState>>) -> Json<PublicLicense> {
    Json(state.store().current().public_view())
}

async fn get_modules(State(state): State<Arc<ApiState>>) -> Json<ModulesResponse> {
    Json(state.modules())
}

async fn get_module_access(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Response {
    match state.gate().check(&name) {
        GateDecision::Admit => Json(AccessGranted {
            success: true,
            module: name,
        })
        .into_response(),
        GateDecision::Deny(denial) => Forbidden(denial).into_response(),
    }
}

async fn get_capacity(
    State(state): State<Arc<ApiState>>,
    Path(feature): Path<String>,
    Query(query): Query<CapacityQuery>,
) -> Response {
    match state.gate().check_capacity(&feature, query.current) {
        GateDecision::Admit => {
            let limit = state.store().current().limit(&feature);
            Json(CapacityGranted {
                success: true,
                feature,
                current: query.current,
                limit,
            })
            .into_response()
        }
        GateDecision::Deny(denial) => Forbidden(denial).into_response(),
    }
}

async fn post_reload(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    state.reload().map(Json).map_err(|err| {
        warn!(error = %err, "reload rejected");
        ApiError::new(StatusCode::CONFLICT, format!("{err:#}"))
    })
}
