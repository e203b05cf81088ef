//! HTTP liveness, readiness and status probes.
//!
//! # Responsibilities
//! - `/healthz`: process is up
//! - `/readyz`: mirrors the [`ReadinessBarrier`] flag, forced off once
//!   shutdown begins
//! - `/status`: readiness plus each leader supervisor's working state

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::health::readiness::ReadinessBarrier;
use crate::lifecycle::Orchestrator;

#[derive(Clone)]
pub struct ProbeState {
    pub readiness: Arc<ReadinessBarrier>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Serialize)]
pub struct SupervisorStatus {
    pub name: String,
    pub working: bool,
}

#[derive(Debug, Serialize)]
pub struct CoordinatorStatus {
    pub version: &'static str,
    pub ready: bool,
    pub shutting_down: bool,
    pub supervisors: Vec<SupervisorStatus>,
}

pub fn probe_router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` is cancelled.
pub async fn serve_probes(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Probe server starting");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("Probe server stopped");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.readiness.is_ready() && !state.orchestrator.is_shutting_down() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn status(State(state): State<ProbeState>) -> Json<CoordinatorStatus> {
    let supervisors = state
        .orchestrator
        .supervisors()
        .iter()
        .map(|s| SupervisorStatus {
            name: s.name().to_string(),
            working: s.is_working(),
        })
        .collect();

    Json(CoordinatorStatus {
        version: env!("CARGO_PKG_VERSION"),
        ready: state.readiness.is_ready(),
        shutting_down: state.orchestrator.is_shutting_down(),
        supervisors,
    })
}
