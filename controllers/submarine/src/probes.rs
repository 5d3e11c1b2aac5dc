//! Health, readiness and metrics endpoints.
//!
//! `/healthz` answers as long as the process is serving. `/readyz` turns
//! ready once the Submarine cache has completed its first list. `/metrics`
//! exposes the controller registry in Prometheus text format.

use crate::error::ControllerError;
use crate::metrics::export_metrics;
use crate::store::TypedStore;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use crds::Submarine;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state behind the probe handlers
#[derive(Clone)]
pub struct ProbeState {
    roots: Arc<TypedStore<Submarine>>,
    registry: Registry,
}

impl ProbeState {
    /// State reporting readiness from `roots` and metrics from `registry`
    pub fn new(roots: Arc<TypedStore<Submarine>>, registry: Registry) -> Self {
        Self { roots, registry }
    }
}

/// Routes for `/healthz`, `/readyz` and `/metrics`
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the probe endpoints on `addr` until the process exits
pub async fn serve(addr: SocketAddr, state: ProbeState) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Probe server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.roots.has_synced() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "cache not synced")
    }
}

async fn metrics(State(state): State<ProbeState>) -> (StatusCode, String) {
    match export_metrics(&state.registry) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
