use std::{io::ErrorKind, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::{
    application::{
        error::HttpError,
        history::{HistoryLookupError, HistoryService},
        ingest::IngestService,
        rates::{FetchError, RateService},
        render::{DocumentFormat, DocumentRenderer, RenderedArtifact},
    },
    domain::rates::RateSnapshot,
    infra::{
        artifacts::{ArtifactStore, StorageError},
        assets,
    },
};

use super::middleware::{log_responses, set_request_context};

const DEFAULT_HISTORY_DAYS: u32 = 7;

#[derive(Clone)]
pub struct HttpState {
    pub rates: Arc<RateService>,
    pub history: Arc<HistoryService>,
    pub ingest: Arc<IngestService>,
    pub renderers: Arc<Vec<Arc<dyn DocumentRenderer>>>,
    pub artifacts: Arc<ArtifactStore>,
}

pub fn build_router(state: HttpState, upload_body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", get(upload_form))
        .route("/exchange-rates", get(exchange_rates))
        .route("/currency-history", get(currency_history))
        .route("/generate-docx", get(generate_docx))
        .route("/generate-pdf", get(generate_pdf))
        .route(
            "/upload-xlsx",
            post(upload_xlsx).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/uploads/{*path}", get(serve_upload))
        .route("/static/{*path}", get(serve_static_asset))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index() -> Response {
    assets::static_page("index.html")
}

async fn upload_form() -> Response {
    assets::static_page("upload.html")
}

async fn serve_static_asset(path: Option<Path<String>>) -> Response {
    assets::serve_static(path).await
}

async fn exchange_rates(State(state): State<HttpState>) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::public::exchange_rates";

    let snapshot = state
        .rates
        .snapshot()
        .await
        .map_err(|err| fetch_error_to_http(SOURCE, err))?;
    Ok(Json(conversion_rates_body(&snapshot)).into_response())
}

fn conversion_rates_body(snapshot: &RateSnapshot) -> serde_json::Value {
    let mut rates = serde_json::Map::new();
    for entry in snapshot.entries() {
        rates.insert(entry.code.clone(), json!(entry.rate));
    }
    json!({ "conversion_rates": rates })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    currency: String,
    #[serde(default = "default_history_days")]
    days: u32,
}

fn default_history_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

async fn currency_history(
    State(state): State<HttpState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::public::currency_history";

    match state.history.series(&query.currency, query.days).await {
        Ok(series) => Ok(Json(json!({
            "dates": series.dates,
            "rates": series.rates,
        }))
        .into_response()),
        Err(HistoryLookupError::UnknownCurrency(currency)) => Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Unknown currency",
            format!("currency `{currency}` has no ticker symbol"),
        )),
        Err(HistoryLookupError::Fetch(err)) => Err(HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch historical data",
            &err,
        )),
    }
}

async fn generate_docx(State(state): State<HttpState>) -> Result<Response, HttpError> {
    generate_document(state, DocumentFormat::Docx).await
}

async fn generate_pdf(State(state): State<HttpState>) -> Result<Response, HttpError> {
    generate_document(state, DocumentFormat::Pdf).await
}

async fn generate_document(
    state: HttpState,
    format: DocumentFormat,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::public::generate_document";

    let renderer = state
        .renderers
        .iter()
        .find(|renderer| renderer.format() == format)
        .ok_or_else(|| {
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Document format unavailable",
                format!("no renderer registered for `{}`", format.as_str()),
            )
        })?;

    let snapshot = state
        .rates
        .snapshot()
        .await
        .map_err(|err| fetch_error_to_http(SOURCE, err))?;

    let artifact = renderer.render(&snapshot).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to render document",
            &err,
        )
    })?;

    Ok(attachment_response(&artifact))
}

fn attachment_response(artifact: &RenderedArtifact) -> Response {
    let mut response = Response::new(Body::from(artifact.bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(artifact.format.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&artifact.bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.suggested_filename
    )) {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    response
}

async fn upload_xlsx(
    State(state): State<HttpState>,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::public::upload_xlsx";

    let (filename, payload) = read_upload_payload(&mut multipart).await?;

    let ingested = state.ingest.ingest(&filename, payload).await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process spreadsheet",
            &err,
        )
    })?;

    let mut data = serde_json::Map::new();
    for (currency, rate) in &ingested.rates {
        data.insert(currency.clone(), json!(rate));
    }

    Ok(Json(json!({
        "filename": ingested.stored_path,
        "data": data,
    }))
    .into_response())
}

async fn read_upload_payload(multipart: &mut Multipart) -> Result<(String, Bytes), HttpError> {
    const SOURCE: &str = "infra::http::public::read_upload_payload";

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }

                let filename = field
                    .file_name()
                    .map(|value| value.to_string())
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| "upload.xlsx".to_string());

                let payload = field.bytes().await.map_err(|err| {
                    multipart_error_to_http(SOURCE, err.status(), err.to_string())
                })?;

                return Ok((filename, payload));
            }
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                error!(
                    target = SOURCE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                return Err(multipart_error_to_http(SOURCE, status, err.to_string()));
            }
        }
    }

    Err(HttpError::new(
        SOURCE,
        StatusCode::BAD_REQUEST,
        "Missing file field",
        "multipart payload holds no `file` field",
    ))
}

fn multipart_error_to_http(source: &'static str, status: StatusCode, detail: String) -> HttpError {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => HttpError::new(
            source,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Uploaded file is too large",
            detail,
        ),
        _ => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Invalid multipart payload",
            detail,
        ),
    }
}

async fn serve_upload(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    match state.artifacts.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(StorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

/// Map a fetch failure onto the response the caller sees: upstream HTTP
/// errors keep their status, transport and validation failures become 500s.
fn fetch_error_to_http(source: &'static str, err: FetchError) -> HttpError {
    match err {
        FetchError::Rejected { status, detail } => HttpError::new(
            source,
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            "Failed to fetch exchange rates",
            detail,
        ),
        FetchError::Unavailable { detail } => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch exchange rates due to a network error",
            detail,
        ),
        FetchError::Invalid(err) => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Rate provider returned unusable data",
            &err,
        ),
    }
}
