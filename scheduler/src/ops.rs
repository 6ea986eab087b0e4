// Operational HTTP surface for the scheduler binary.
//
// A manual tick performs identically to a scheduled one; the endpoint exists
// for operational testing and diagnostics, not as an application API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use common::db::DbPool;
use common::scheduler::{Scheduler, SchedulerEngine};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct OpsState {
    pub engine: Arc<SchedulerEngine>,
    pub db: DbPool,
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/ticks", post(run_tick))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tracing::instrument(skip(state))]
async fn health(State(state): State<OpsState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database unavailable"),
    }
}

#[tracing::instrument(skip(state))]
async fn run_tick(State(state): State<OpsState>) -> impl IntoResponse {
    let now = Local::now().naive_local();
    match state.engine.run_tick(now).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "Manual tick failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
