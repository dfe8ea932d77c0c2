//! REST API routes

use crate::download::{CleanupFilter, DownloadRequest, DownloadStats, ProgressRecord};
use crate::error::Error;
use crate::media::{MediaLink, VideoInfo};
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/info", post(video_info))
        .route("/download", post(start_download))
        .route("/download/{id}", delete(cancel_download))
        .route("/progress/{id}", get(download_progress))
        .route("/file/{*filename}", get(serve_file))
        .route("/cleanup", post(cleanup_files))
        .route("/stats", get(download_stats))
}

// ============ Info Endpoint ============

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

/// Probe a link and list its quality options
async fn video_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<VideoInfo>, AppError> {
    let Json(req) = payload?;
    let link = MediaLink::parse(&req.url)?;
    info!("Fetching info for {}", link.video_id);

    let raw = state.backend.probe(&link.canonical_url).await?;
    Ok(Json(VideoInfo::from_raw(&raw)))
}

// ============ Download Endpoints ============

/// Response after starting a download
#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub id: String,
    pub status: &'static str,
}

/// Start a download in the background
async fn start_download(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartDownloadResponse>), AppError> {
    let Json(req) = payload?;
    let id = state.download_manager.start(req)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartDownloadResponse {
            id,
            status: "downloading",
        }),
    ))
}

/// Cancel an active download
async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if state.download_manager.cancel(&id) {
        (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Download not found or already completed" })),
        )
            .into_response()
    }
}

/// Poll a download; 404 means it has not been registered (yet)
async fn download_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProgressRecord>, Response> {
    state
        .download_manager
        .registry()
        .get(&id)
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "Unknown download id",
                    "status": "unknown",
                    "percent": 0,
                })),
            )
                .into_response()
        })
}

/// Get download statistics
async fn download_stats(State(state): State<Arc<AppState>>) -> Json<DownloadStats> {
    Json(state.download_manager.stats())
}

// ============ File Endpoints ============

/// Send a finished file as an attachment
async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    let path = state.store.resolve(&filename).await?;

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    if response.status().is_success() {
        if let Ok(value) = HeaderValue::from_str(&content_disposition(&filename)) {
            response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }
        let released = state.download_manager.registry().release_file(&filename);
        info!("Serving {} (released {} progress records)", filename, released);
    }

    Ok(response)
}

fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"')
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
    pub message: String,
}

/// Delete downloaded files; never fails the caller
async fn cleanup_files(State(state): State<Arc<AppState>>, body: Bytes) -> Json<CleanupResponse> {
    let filter = if body.is_empty() {
        CleanupFilter::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            warn!("Ignoring malformed cleanup filter: {}", e);
            CleanupFilter::default()
        })
    };

    let keep_in_flight = state.download_manager.active_count() > 0;
    let removed = state.store.cleanup(filter, keep_in_flight).await;
    info!("Cleanup removed {} files", removed);

    Json(CleanupResponse {
        removed,
        message: format!("{} files removed", removed),
    })
}

// ============ Error Handling ============

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    Unprocessable(String),
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "extraction", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
        };

        let body = Json(serde_json::json!({ "error": message, "kind": kind }));
        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => AppError::BadRequest(msg),
            Error::Extraction(msg) => AppError::Unprocessable(msg),
            Error::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}
