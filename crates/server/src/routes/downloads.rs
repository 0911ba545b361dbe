// crates/server/src/routes/downloads.rs
//! Artifact download endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::routing::get;
use axum::Router;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the download routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/downloads/{name}", get(download_artifact))
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

/// GET /api/downloads/{name} - Serve a generated artifact as an attachment.
///
/// The name must be a bare filename inside the data dir; anything that
/// looks like a path is rejected outright.
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<(HeaderMap, Vec<u8>)> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ApiError::BadRequest("Invalid file name".to_string()));
    }

    let path = state.data_dir.join(&name);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::ArtifactNotFound(name));
        }
        Err(e) => {
            return Err(ApiError::Internal(format!("Failed to read {name}: {e}")));
        }
    };
    tracing::debug!(file = %name, bytes = data.len(), "Serving artifact");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&name)),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((headers, data))
}
