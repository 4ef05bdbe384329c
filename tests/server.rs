//! HTTP layer tests driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use idmp_extract::{
    router, AppState, Credentials, ExtractError, LayoutAnalysisResult, LayoutAnalyzer,
    SessionConfig, TextExtractor,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "idmp-test-boundary";

// ── Test doubles ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct BytesAsText {
    calls: AtomicUsize,
}

#[async_trait]
impl TextExtractor for BytesAsText {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(String::from_utf8_lossy(&std::fs::read(path).unwrap()).into_owned())
    }
}

struct RejectMarked;

#[async_trait]
impl LayoutAnalyzer for RejectMarked {
    async fn analyze(
        &self,
        path: &Path,
        _credentials: &Credentials,
    ) -> Result<LayoutAnalysisResult, ExtractError> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.contains("REJECT") {
            return Err(ExtractError::RemoteRequestFailed {
                status: Some(401),
                code: Some("401".into()),
                message: "Access denied due to invalid subscription key.".into(),
            });
        }
        Ok(LayoutAnalysisResult {
            model_id: "prebuilt-layout".into(),
            api_version: "2023-07-31".into(),
            analyze_result: json!({ "pages": [{ "pageNumber": 1 }] }),
        })
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn app_with(endpoint: &str, key: &str) -> (Router, Arc<BytesAsText>) {
    let extractor = Arc::new(BytesAsText::default());
    let config = SessionConfig::builder()
        .endpoint(endpoint)
        .key(key)
        .extractor(extractor.clone() as Arc<dyn TextExtractor>)
        .analyzer(Arc::new(RejectMarked) as Arc<dyn LayoutAnalyzer>)
        .build()
        .unwrap();
    (router(AppState::new(config)), extractor)
}

fn app() -> Router {
    app_with("https://example.test/", "test-key").0
}

fn upload_request(files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
Content-Type: application/pdf\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(res: axum::response::Response) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn upload(app: &Router, files: &[(&str, &str)]) -> StatusCode {
    app.clone()
        .oneshot(upload_request(files))
        .await
        .unwrap()
        .status()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health() {
    let res = app().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v: Value = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(v, json!({ "status": "ok" }));
}

#[tokio::test]
async fn empty_page_before_any_upload() {
    let res = app().oneshot(get("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_string(res).await;
    assert!(html.contains("IDMP Text Extraction Prototype"));
    assert!(html.contains("Upload PDF Documents"));
    assert!(!html.contains("Select a Document"));
}

#[tokio::test]
async fn missing_configuration_shows_only_the_error() {
    let (app, _) = app_with("", "");
    let res = app.oneshot(get("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_string(res).await;
    assert!(html.contains("Azure Form Recognizer configuration is missing"));
    assert!(html.contains("FORM_RECOGNIZER_ENDPOINT"));
    assert!(!html.contains("Select a Document"));
}

#[tokio::test]
async fn upload_without_configuration_processes_nothing() {
    let (app, extractor) = app_with("https://example.test/", "");
    let res = app
        .clone()
        .oneshot(upload_request(&[("a.pdf", "alpha")]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_string(res).await.contains("configuration is missing"));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_without_configuration_ignores_file_contents() {
    let (app, extractor) = app_with("", "");
    let res = app
        .oneshot(upload_request(&[("notes.txt", "plain text")]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_string(res).await;
    assert!(html.contains("configuration is missing"));
    assert!(!html.contains("Only PDF documents"));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let app = app();
    assert_eq!(
        upload(&app, &[("notes.txt", "plain text")]).await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn uploaded_documents_are_listed_and_first_is_selected() {
    let app = app();
    let status = upload(
        &app,
        &[
            ("a.pdf", "hello world hello world hello"),
            ("b.pdf", "beta document contents"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let html = body_string(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(html.contains("Select a Document"));
    assert!(html.contains("value=\"a.pdf\" checked"));
    assert!(html.contains("value=\"b.pdf\""));
    assert!(html.contains("Word Cloud for Selected Document (Name: a.pdf)"));
    assert!(html.contains("data:image/png;base64,"));
    assert!(html.contains("Extracted Text for Selected Document (Name: a.pdf)"));
    assert!(html.contains("hello world hello world hello"));

    let html = body_string(app.clone().oneshot(get("/?doc=b.pdf")).await.unwrap()).await;
    assert!(html.contains("(Name: b.pdf)"));
    assert!(html.contains("beta document contents"));
    assert!(!html.contains("hello world hello world hello"));
}

#[tokio::test]
async fn rejected_document_shows_error_and_is_not_selectable() {
    let app = app();
    upload(&app, &[("a.pdf", "good words here"), ("b.pdf", "REJECT")]).await;

    let html = body_string(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(html.contains("Error analyzing document"));
    assert!(html.contains("b.pdf"));
    assert!(html.contains("value=\"a.pdf\""));
    assert!(!html.contains("value=\"b.pdf\""));

    let res = app.oneshot(get("/documents/text?doc=b.pdf")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_endpoints_serve_text_layout_and_png() {
    let app = app();
    upload(&app, &[("a.pdf", "medicinal product medicinal")]).await;

    let res = app.clone().oneshot(get("/documents/text?doc=a.pdf")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_string(res).await, "medicinal product medicinal");

    let res = app
        .clone()
        .oneshot(get("/documents/analysis?doc=a.pdf"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v: Value = serde_json::from_str(&body_string(res).await).unwrap();
    assert_eq!(v["model_id"], "prebuilt-layout");
    assert_eq!(v["analyze_result"]["pages"][0]["pageNumber"], 1);

    let res = app
        .clone()
        .oneshot(get("/documents/wordcloud.png?doc=a.pdf"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    let png = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn unknown_document_is_404() {
    let app = app();
    upload(&app, &[("a.pdf", "alpha words")]).await;

    for uri in [
        "/?doc=missing.pdf",
        "/documents/text?doc=missing.pdf",
        "/documents/analysis?doc=missing.pdf",
        "/documents/wordcloud.png?doc=missing.pdf",
    ] {
        let res = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn document_without_words_shows_a_message() {
    let app = app();
    upload(&app, &[("empty.pdf", "the and of")]).await;

    let html = body_string(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(html.contains("(Name: empty.pdf)"));
    assert!(html.contains("at least 1 word"));
    assert!(!html.contains("data:image/png;base64,"));

    let res = app
        .oneshot(get("/documents/wordcloud.png?doc=empty.pdf"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn new_upload_replaces_the_session() {
    let app = app();
    upload(&app, &[("a.pdf", "first batch")]).await;
    upload(&app, &[("c.pdf", "second batch")]).await;

    let html = body_string(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(html.contains("value=\"c.pdf\" checked"));
    assert!(!html.contains("value=\"a.pdf\""));
}

#[tokio::test]
async fn page_render_and_upload_can_overlap() {
    let app = app();
    upload(&app, &[("a.pdf", "first batch of words")]).await;

    let (page, status) = tokio::join!(
        app.clone().oneshot(get("/")),
        upload(&app, &[("c.pdf", "second batch of words")])
    );
    assert_eq!(page.unwrap().status(), StatusCode::OK);
    assert_eq!(status, StatusCode::SEE_OTHER);

    let html = body_string(app.oneshot(get("/")).await.unwrap()).await;
    assert!(html.contains("value=\"c.pdf\" checked"));
}
