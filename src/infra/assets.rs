//! Embedded static asset serving utilities.

use axum::{
    body::Body,
    extract::Path,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, include_dir};
use mime_guess::Mime;

use crate::application::error::ErrorReport;

static STATIC_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Serve embedded static assets under `/static/{*path}`.
pub async fn serve_static(path: Option<Path<String>>) -> Response {
    const SOURCE: &str = "infra::assets::serve_static";

    let mut candidate = path.map(|Path(value)| value).unwrap_or_default();
    if candidate.starts_with('/') {
        candidate = candidate.trim_start_matches('/').to_string();
    }

    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        // Avoid directory traversal and disallow directory listings.
        return not_found_response(SOURCE);
    }

    match STATIC_ASSETS.get_file(&candidate) {
        Some(file) => build_response(
            Bytes::from_static(file.contents()),
            mime_guess::from_path(&candidate).first_or_octet_stream(),
        ),
        None => not_found_response(SOURCE),
    }
}

/// Serve one embedded HTML page by name, e.g. the landing and upload pages.
pub fn static_page(name: &'static str) -> Response {
    const SOURCE: &str = "infra::assets::static_page";

    match STATIC_ASSETS.get_file(name) {
        Some(file) => {
            let mut response = Response::new(Body::from(Bytes::from_static(file.contents())));
            *response.status_mut() = StatusCode::OK;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response
        }
        None => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("embedded page `{name}` missing from bundle"),
            )
            .attach(&mut response);
            response
        }
    }
}

fn not_found_response(source: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    response
}
