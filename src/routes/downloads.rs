use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};

use crate::{
    error::GatewayError,
    models::download::{CancelAllResponse, DownloadsSnapshotResponse, StartDownloadRequest, StartDownloadResponse},
    state::AppState,
};

#[tracing::instrument(name = "downloads.list", skip_all)]
pub async fn list_downloads(State(state): State<AppState>) -> Json<DownloadsSnapshotResponse> {
    Json(state.downloads.snapshot())
}

/// Starts a tracked model-file download. Not part of the literal endpoint
/// table in §4.6, which only describes the manager's internal state machine;
/// added here so the snapshot/cancel endpoints have something to observe.
#[tracing::instrument(name = "downloads.start", skip_all)]
pub async fn start_download(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let request = StartDownloadRequest::from_json(&body)?;
    request.validate()?;
    let id = state.downloads.start(request.url, request.local_path)?;
    Ok((StatusCode::ACCEPTED, Json(StartDownloadResponse { id })).into_response())
}

#[tracing::instrument(name = "downloads.cancel_all", skip_all)]
pub async fn cancel_all_downloads(State(state): State<AppState>) -> Json<CancelAllResponse> {
    Json(state.downloads.cancel_all().await)
}
