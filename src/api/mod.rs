//! HTTP surface for both lease queues.
//!
//! Trusted queue (bearer token for worker calls):
//! - `POST /api/jobs`, `GET /api/jobs`, `GET /api/jobs/{id}`
//! - `GET /api/worker/jobs/next`, `POST /api/worker/jobs/{id}/complete`
//!
//! Edge queue (feature flag, registered workers, capability tags):
//! - `POST /api/edge/jobs`, `GET /api/edge/jobs`, `GET /api/edge/jobs/{id}`
//! - `GET /api/edge/jobs/next`, `POST /api/edge/jobs/{id}/complete`
//! - `POST /api/edge/workers/register`, `POST /api/edge/workers/heartbeat`,
//!   `GET /api/edge/workers`
//!
//! Errors are `{"error": "<code>"}`; `204` means only "no job available".

pub mod auth;
pub mod edge;
pub mod error;
pub mod jobs;
pub mod trusted;
pub mod types;

use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::scheduler::{EdgeDispatcher, TagPolicy, TokenPolicy, TrustedDispatcher};
use types::StatsResponse;

#[derive(Clone)]
pub struct ApiState {
    pub trusted: Arc<TrustedDispatcher>,
    pub edge: Arc<EdgeDispatcher>,
}

impl FromRef<ApiState> for Arc<TrustedDispatcher> {
    fn from_ref(state: &ApiState) -> Self {
        state.trusted.clone()
    }
}

impl FromRef<ApiState> for Arc<EdgeDispatcher> {
    fn from_ref(state: &ApiState) -> Self {
        state.edge.clone()
    }
}

pub fn router(state: ApiState) -> Router {
    // Browser workers call the edge endpoints cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        // Trusted queue
        .route(
            "/api/jobs",
            post(trusted::submit_job).get(jobs::list_jobs::<TokenPolicy>),
        )
        .route("/api/jobs/{id}", get(jobs::inspect_job::<TokenPolicy>))
        .route("/api/worker/jobs/next", get(jobs::lease_next::<TokenPolicy>))
        .route(
            "/api/worker/jobs/{id}/complete",
            post(jobs::complete_job::<TokenPolicy>),
        )
        // Edge queue
        .route(
            "/api/edge/jobs",
            post(edge::submit_job).get(jobs::list_jobs::<TagPolicy>),
        )
        .route("/api/edge/jobs/next", get(jobs::lease_next::<TagPolicy>))
        .route("/api/edge/jobs/{id}", get(jobs::inspect_job::<TagPolicy>))
        .route(
            "/api/edge/jobs/{id}/complete",
            post(jobs::complete_job::<TagPolicy>),
        )
        .route("/api/edge/workers", get(edge::list_workers))
        .route("/api/edge/workers/register", post(edge::register_worker))
        .route("/api/edge/workers/heartbeat", post(edge::heartbeat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Starting HTTP server");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats_handler(State(state): State<ApiState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        trusted: state.trusted.stats().await,
        edge: state.edge.stats().await,
    })
}
