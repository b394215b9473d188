//! ---
//! tienda_section: "05-networking-external-interfaces"
//! tienda_subsection: "module"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Request-time module gating middleware."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tienda_licensing::{AccessGate, Denial, DenialCode, GateDecision};

/// JSON body returned with every 403.
#[derive(Debug, Clone, Serialize)]
pub struct DenialBody {
    pub success: bool,
    pub message: String,
    pub error: DenialCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl From<&Denial> for DenialBody {
    fn from(denial: &Denial) -> Self {
        let (module, feature) = match denial.code {
            DenialCode::LicenseInvalid => (None, None),
            DenialCode::ModuleNotLicensed | DenialCode::ModuleInactive => {
                (denial.target.clone(), None)
            }
            DenialCode::LimitReached => (None, denial.target.clone()),
        };
        Self {
            success: false,
            message: denial.message(),
            error: denial.code,
            module,
            feature,
        }
    }
}

/// A denial rendered as `403 Forbidden`.
#[derive(Debug, Clone)]
pub struct Forbidden(pub Denial);

impl IntoResponse for Forbidden {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(DenialBody::from(&self.0))).into_response()
    }
}

#[derive(Clone)]
struct ModuleGuard {
    gate: Arc<AccessGate>,
    module: Arc<str>,
}

/// Reject every route of `router` unless `module` is admitted by `gate`.
///
/// The check runs per request against the cached license snapshot.
pub fn require_module<S>(router: Router<S>, gate: Arc<AccessGate>, module: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let guard = ModuleGuard {
        gate,
        module: Arc::from(module),
    };
    router.route_layer(middleware::from_fn_with_state(guard, module_guard))
}

async fn module_guard(State(guard): State<ModuleGuard>, request: Request, next: Next) -> Response {
    match guard.gate.check(&guard.module) {
        GateDecision::Admit => next.run(request).await,
        GateDecision::Deny(denial) => Forbidden(denial).into_response(),
    }
}
