//! Web UI: upload PDFs, pick one, see its word cloud and text.
//!
//! ```text
//! GET  /                              page (upload form, selector, selected document)
//! POST /upload                        multipart `files` → new session → 303 /
//! GET  /documents/wordcloud.png?doc=  PNG
//! GET  /documents/text?doc=           plain text
//! GET  /documents/analysis?doc=       layout JSON
//! GET  /health                        {"status":"ok"}
//! ```
//!
//! The latest [`SessionOutcome`] lives behind a `tokio::sync::RwLock`. An
//! upload builds a complete new outcome and swaps it in, so readers never
//! see a half-processed batch. Everything except `/upload` is read-only.

pub mod html;

use crate::config::SessionConfig;
use crate::error::ExtractError;
use crate::pipeline::upload::UploadedDocument;
use crate::process::process_uploads;
use crate::session::{DocumentRecord, SessionOutcome};
use crate::wordcloud::{generate_wordcloud, WordCloudConfig};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use html::{IndexView, SelectedDocument, WordCloudView};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

// ── State ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    config: Arc<SessionConfig>,
    /// `None` until the first upload.
    session: Arc<RwLock<Option<SessionOutcome>>>,
}

impl AppState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(RwLock::new(None)),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

pub struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Html(html::error_page(&self.1))).into_response()
    }
}

fn not_found(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::NOT_FOUND, msg.into())
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

fn internal(e: ExtractError) -> AppError {
    AppError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ── Router ───────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index_handler))
        .route("/upload", post(upload_handler))
        .route("/documents/wordcloud.png", get(wordcloud_handler))
        .route("/documents/text", get(text_handler))
        .route("/documents/analysis", get(analysis_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// Bind `addr` and serve until the process stops.
pub async fn serve(config: SessionConfig, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(AppState::new(config))).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct DocQuery {
    doc: Option<String>,
}

async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Html<String>, AppError> {
    if let Err(e) = state.config.credentials() {
        return Ok(Html(html::config_error_page(&e.to_string())));
    }

    // Snapshot what the page needs so rendering runs without the lock.
    let (keys, failures, documents, selected) = {
        let session = state.session.read().await;
        let Some(outcome) = session.as_ref() else {
            return Ok(Html(html::index_page(&IndexView::default())));
        };
        let selected = match query.doc.as_deref().or_else(|| outcome.store.first_key()) {
            Some(key) => {
                let record = outcome
                    .store
                    .get(key)
                    .ok_or_else(|| not_found(format!("No document named '{key}'")))?;
                Some((key.to_string(), record.text.clone()))
            }
            None => None,
        };
        let keys: Vec<String> = outcome.store.keys().map(str::to_string).collect();
        (keys, outcome.failures.clone(), outcome.stats.documents, selected)
    };

    let selected = match &selected {
        Some((key, text)) => {
            let wordcloud = match render_png(text.clone(), state.config.wordcloud.clone()).await {
                Ok(png) => WordCloudView::Png(STANDARD.encode(png)),
                Err(e @ ExtractError::NoWords) => WordCloudView::Unavailable(e.to_string()),
                Err(e) => return Err(internal(e)),
            };
            Some(SelectedDocument {
                key,
                text,
                wordcloud,
            })
        }
        None => None,
    };

    Ok(Html(html::index_page(&IndexView {
        keys: keys.iter().map(String::as_str).collect(),
        failures: &failures,
        selected,
        last_batch: Some(documents),
    })))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    // Nothing is read or validated without a usable configuration.
    if let Err(e) = state.config.credentials() {
        return Ok(Html(html::config_error_page(&e.to_string())).into_response());
    }

    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError(e.status(), e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        // Browsers send an unnamed empty part when no file was chosen.
        let Some(name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };
        if !is_pdf_name(&name) {
            return Err(bad_request(format!(
                "Only PDF documents can be uploaded, got '{name}'"
            )));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError(e.status(), e.body_text()))?;
        uploads.push(UploadedDocument::new(name, bytes.to_vec()));
    }

    info!("Received {} upload(s)", uploads.len());
    match process_uploads(uploads, &state.config).await {
        Ok(outcome) => {
            *state.session.write().await = Some(outcome);
            Ok(Redirect::to("/").into_response())
        }
        Err(e @ ExtractError::MissingConfiguration { .. }) => {
            Ok(Html(html::config_error_page(&e.to_string())).into_response())
        }
        Err(e) => {
            error!("Upload batch failed: {}", e);
            Err(internal(e))
        }
    }
}

async fn wordcloud_handler(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Response, AppError> {
    let text = {
        let session = state.session.read().await;
        lookup(session.as_ref(), &query)?.text.clone()
    };
    match render_png(text, state.config.wordcloud.clone()).await {
        Ok(png) => Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response()),
        Err(e @ ExtractError::NoWords) => {
            Err(AppError(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(e) => Err(internal(e)),
    }
}

async fn text_handler(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Response, AppError> {
    let session = state.session.read().await;
    let record = lookup(session.as_ref(), &query)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        record.text.clone(),
    )
        .into_response())
}

async fn analysis_handler(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Response, AppError> {
    let session = state.session.read().await;
    let record = lookup(session.as_ref(), &query)?;
    Ok(Json(record.analysis.clone()).into_response())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn lookup<'a>(
    session: Option<&'a SessionOutcome>,
    query: &DocQuery,
) -> Result<&'a DocumentRecord, AppError> {
    let key = query
        .doc
        .as_deref()
        .ok_or_else(|| bad_request("Missing 'doc' query parameter"))?;
    session
        .and_then(|outcome| outcome.store.get(key))
        .ok_or_else(|| not_found(format!("No document named '{key}'")))
}

fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Word cloud rendering is CPU-bound; keep it off the async workers.
async fn render_png(text: String, config: WordCloudConfig) -> Result<Vec<u8>, ExtractError> {
    tokio::task::spawn_blocking(move || generate_wordcloud(&text, &config)?.to_png())
        .await
        .map_err(|e| ExtractError::Internal(format!("Word cloud task panicked: {e}")))?
}
