//! Trigger HTTP surface
//!
//! Thin admin/scheduler boundary over the orchestrator: run a job, read
//! pipeline status, liveness probe. Per-unit stage failures ride inside a
//! 200 response; only fatal request problems map to error status codes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json,
    Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::domain::TriggerRequest;
use crate::error::{MatchdayError, Result};
use crate::pipeline::Orchestrator;

/// HTTP server exposing the trigger boundary.
pub struct ApiServer {
    orchestrator: Arc<Orchestrator>,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(orchestrator: Arc<Orchestrator>, host: impl Into<String>, port: u16) -> Self {
        Self {
            orchestrator,
            host: host.into(),
            port,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = create_router(self.orchestrator.clone());

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| MatchdayError::ConfigValidation(format!("invalid server address: {e}")))?;
        info!("starting trigger server on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| MatchdayError::Internal(format!("trigger server error: {e}")))?;

        Ok(())
    }
}

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs/run", post(run_job_handler))
        .route("/jobs/status", get(status_handler))
        .route("/health", get(liveness_handler))
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn run_job_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<TriggerRequest>,
) -> impl IntoResponse {
    match orchestrator.trigger(req).await {
        Ok(report) => (StatusCode::OK, Json(json!(report))),
        Err(e) => {
            error!(error = %e, "trigger rejected");
            (
                error_status(&e),
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

/// Status reads fail open: a broken store degrades the payload instead of
/// turning the monitoring endpoint itself into a 5xx.
async fn status_handler(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    match orchestrator.store().status_overview().await {
        Ok(overview) => (
            StatusCode::OK,
            Json(json!({ "available": true, "overview": overview })),
        ),
        Err(e) => {
            error!(error = %e, "status overview unavailable");
            (
                StatusCode::OK,
                Json(json!({ "available": false, "error": e.to_string() })),
            )
        }
    }
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

fn error_status(err: &MatchdayError) -> StatusCode {
    match err {
        MatchdayError::InvalidCursor(_) | MatchdayError::UnknownLeague(_) => {
            StatusCode::BAD_REQUEST
        }
        MatchdayError::LockStore { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
