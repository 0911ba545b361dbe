// crates/server/src/routes/jobs.rs
//! Job lifecycle and status endpoints.
//!
//! - `POST /api/jobs/{key}/begin`  — launch the worker (idempotent)
//! - `POST /api/jobs/{key}/cancel` — request cancellation
//! - `GET  /api/jobs`              — snapshots of all tracked jobs
//! - `GET  /api/jobs/{key}`        — JSON snapshot (reliable through any proxy)
//! - `GET  /api/jobs/{key}/stream` — SSE stream of status frames
//! - `GET  /api/jobs/{key}/results` — artifact listing for a completed job

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use takeoff_core::ArtifactRole;

use crate::error::{ApiError, ApiResult};
use crate::jobs::supervisor::BeginOutcome;
use crate::jobs::{JobSnapshot, JobStatus};
use crate::state::AppState;

/// Create the job routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{key}", get(job_status))
        .route("/jobs/{key}/begin", post(begin_job))
        .route("/jobs/{key}/cancel", post(cancel_job))
        .route("/jobs/{key}/stream", get(job_stream))
        .route("/jobs/{key}/results", get(job_results))
}

/// GET /api/jobs - Snapshots of every tracked job.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    let mut snapshots = state.registry().snapshots();
    snapshots.sort_by(|a, b| a.key.cmp(&b.key));
    Json(snapshots)
}

/// GET /api/jobs/{key} - Current snapshot, for polling clients.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    state
        .registry()
        .snapshot(&key)
        .map(Json)
        .ok_or(ApiError::JobNotFound(key))
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct BeginResponse {
    pub status: String,
}

/// POST /api/jobs/{key}/begin - Launch analysis for an uploaded model.
///
/// Safe to call repeatedly; a key with a live worker is left alone.
pub async fn begin_job(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<BeginResponse>> {
    let status = match state.supervisor.begin(&key) {
        BeginOutcome::Launched => "started",
        BeginOutcome::AlreadyRunning => "already_running",
        BeginOutcome::AlreadyTerminal => "already_finished",
        BeginOutcome::Unknown => return Err(ApiError::JobNotFound(key)),
    };
    Ok(Json(BeginResponse {
        status: status.to_string(),
    }))
}

/// POST /api/jobs/{key}/cancel - Request cancellation of a live run.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<BeginResponse>> {
    if !state.registry().exists(&key) {
        return Err(ApiError::JobNotFound(key));
    }
    if !state.supervisor.cancel(&key) {
        return Err(ApiError::Conflict(
            "No cancellable run for this job".to_string(),
        ));
    }
    Ok(Json(BeginResponse {
        status: "cancelling".to_string(),
    }))
}

/// SSE handler that streams status frames for one job.
///
/// The current snapshot is sent immediately, then broadcast frames for this
/// key are forwarded as `status` events. The stream terminates after a
/// terminal frame; a completed frame carries `redirectUrl`.
pub async fn job_stream(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    if !state.registry().exists(&key) {
        return Err(ApiError::JobNotFound(key));
    }
    // Subscribe before the first snapshot so no frame falls in the gap.
    let mut rx = state.live().subscribe();
    let registry = Arc::clone(state.registry());

    let stream = async_stream::stream! {
        if let Some(snapshot) = registry.snapshot(&key) {
            let terminal = snapshot.is_terminal();
            if let Some(event) = status_event(&snapshot) {
                yield Ok(event);
            }
            if terminal {
                return;
            }
        }

        loop {
            match rx.recv().await {
                Ok(frame) if frame.key == key => {
                    let terminal = frame.is_terminal();
                    if let Some(event) = status_event(&frame) {
                        yield Ok(event);
                    }
                    if terminal {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_key = %key, skipped, "Status stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

fn status_event(snapshot: &JobSnapshot) -> Option<Event> {
    match Event::default().event("status").json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!(job_key = %snapshot.key, error = %e, "Failed to encode status frame");
            None
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ArtifactInfo {
    pub role: String,
    pub file_name: String,
    pub available: bool,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ResultsResponse {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub artifacts: Vec<ArtifactInfo>,
}

/// GET /api/jobs/{key}/results - Artifact listing for a completed job.
///
/// Reports which recorded artifacts are actually present on disk; a file
/// deleted out from under the server shows up as unavailable rather than
/// breaking the page.
pub async fn job_results(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<ResultsResponse>> {
    let job = state
        .registry()
        .get(&key)
        .ok_or_else(|| ApiError::JobNotFound(key.clone()))?;

    match job.status() {
        JobStatus::Completed => {}
        JobStatus::Failed => {
            return Err(ApiError::Conflict(
                job.error.unwrap_or_else(|| "Analysis failed".to_string()),
            ));
        }
        _ => {
            return Err(ApiError::Conflict("Analysis is not complete".to_string()));
        }
    }

    let mut artifacts = Vec::with_capacity(job.results.len());
    // Fixed role order, regardless of map order.
    for role in [
        ArtifactRole::Primary,
        ArtifactRole::Summary,
        ArtifactRole::Detail,
    ] {
        let Some(file_name) = job.results.get(role.as_str()) else {
            continue;
        };
        let available = tokio::fs::metadata(state.data_dir.join(file_name))
            .await
            .is_ok();
        artifacts.push(ArtifactInfo {
            role: role.as_str().to_string(),
            file_name: file_name.clone(),
            available,
            download_url: format!("/api/downloads/{file_name}"),
        });
    }

    Ok(Json(ResultsResponse {
        key,
        warning: job.warning,
        artifacts,
    }))
}
