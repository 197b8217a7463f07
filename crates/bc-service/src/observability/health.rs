//! Health endpoints.
//!
//! - `GET /health` - Liveness check (is the process running?)
//! - `GET /ready` - Readiness check (is the signaling listener accepting?)
//! - `GET /status` - Registry occupancy as JSON, for operators
//!
//! `/metrics` is merged in by `main` from the Prometheus exporter.

use crate::actors::RegistryHandle;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags for health checks.
#[derive(Debug)]
pub struct HealthState {
    /// True once startup initialization finished.
    live: AtomicBool,
    /// True while the signaling listener is bound and not draining.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark not ready (during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct HealthContext {
    state: Arc<HealthState>,
    registry: RegistryHandle,
}

/// Router with `/health`, `/ready` and `/status`.
pub fn health_router(health_state: Arc<HealthState>, registry: RegistryHandle) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .route("/status", get(status_handler))
        .with_state(HealthContext {
            state: health_state,
            registry,
        })
}

async fn liveness_handler(State(ctx): State<HealthContext>) -> StatusCode {
    if ctx.state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(ctx): State<HealthContext>) -> StatusCode {
    if ctx.state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Current teacher and student slots. 503 if the registry is gone.
async fn status_handler(
    State(ctx): State<HealthContext>,
) -> Result<Json<crate::actors::RegistrySnapshot>, StatusCode> {
    ctx.registry
        .snapshot()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
