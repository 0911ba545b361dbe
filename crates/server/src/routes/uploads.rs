// crates/server/src/routes/uploads.rs
//! Model upload endpoint.
//!
//! Accepts a multipart form with a `file` field, stores the model under a
//! sanitized timestamped key in the data dir, and seeds a pending job. The
//! client begins the job with a separate request, so an upload alone never
//! consumes a worker.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use takeoff_core::{derive_job_key, key_extension};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct UploadResponse {
    pub key: String,
    pub status_url: String,
    pub stream_url: String,
}

/// Create the upload routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/uploads", post(upload_model))
}

/// POST /api/uploads - Store an uploaded model and register a pending job.
pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            upload = Some((file_name, data));
            break;
        }
    }

    let Some((file_name, data)) = upload else {
        return Err(ApiError::BadRequest("No file part in request".to_string()));
    };
    let response = store_upload(
        &state,
        &file_name,
        &data,
        chrono::Utc::now().timestamp() as u64,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Validate, claim a job key, then persist the model bytes.
///
/// The key is registered before anything touches the disk; a colliding
/// upload is rejected without overwriting the stored model of the job that
/// already owns the key.
pub(crate) async fn store_upload(
    state: &AppState,
    file_name: &str,
    data: &[u8],
    unix_timestamp: u64,
) -> ApiResult<UploadResponse> {
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let key = derive_job_key(file_name, unix_timestamp);
    let allowed = key_extension(&key)
        .map(|ext| state.allowed_extensions.contains(&ext))
        .unwrap_or(false);
    if !allowed {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type, expected one of: {}",
            state.allowed_extensions.join(", ")
        )));
    }

    if !state.supervisor.submit(&key) {
        return Err(ApiError::Conflict(format!(
            "A job already exists for key {key}"
        )));
    }

    let path = state.data_dir.join(&key);
    if let Err(e) = tokio::fs::write(&path, data).await {
        // The claimed job must not linger as a runnable pending entry.
        state
            .registry()
            .update(&key, |job| job.fail(format!("Failed to store upload: {e}")));
        return Err(ApiError::Internal(format!("Failed to store upload: {e}")));
    }
    tracing::info!(job_key = %key, bytes = data.len(), "Model uploaded");

    Ok(UploadResponse {
        status_url: format!("/api/jobs/{key}"),
        stream_url: format!("/api/jobs/{key}/stream"),
        key,
    })
}
