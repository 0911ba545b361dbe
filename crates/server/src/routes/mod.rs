//! API route handlers for the takeoff server.

pub mod downloads;
pub mod health;
pub mod jobs;
pub mod uploads;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/uploads - Upload a model and register a pending job
/// - GET  /api/jobs - List all tracked jobs
/// - GET  /api/jobs/{key} - JSON status snapshot
/// - POST /api/jobs/{key}/begin - Launch the analysis (idempotent)
/// - POST /api/jobs/{key}/cancel - Request cancellation
/// - GET  /api/jobs/{key}/stream - SSE stream of status frames
/// - GET  /api/jobs/{key}/results - Artifact listing for a completed job
/// - GET  /api/downloads/{name} - Download a generated artifact
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", uploads::router())
        .nest("/api", jobs::router())
        .nest("/api", downloads::router())
        .with_state(state)
}
