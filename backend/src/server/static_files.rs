//! Static file serving with the embedded single-page UI

use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "static"]
struct Assets;

fn asset_response(path: &str, data: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ([(header::CONTENT_TYPE, mime.as_ref().to_string())], Body::from(data)).into_response()
}

/// Handle static file requests
pub async fn static_handler(uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    // Try to serve the exact path
    if !path.is_empty() {
        if let Some(content) = Assets::get(path) {
            return asset_response(path, content.data.into_owned());
        }
    }

    // Page routes fall back to index.html
    if !path.contains('.') {
        if let Some(content) = Assets::get("index.html") {
            return asset_response("index.html", content.data.into_owned());
        }
    }

    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
