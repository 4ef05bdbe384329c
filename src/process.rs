//! Upload-batch orchestration.
//!
//! ```text
//! credentials gate ──▶ for each upload (upload order):
//!                        persist ─▶ extract text ─▶ analyze layout
//!                                                      │
//!                              record ◀── Ok ──────────┤
//!                     DocumentError ◀── remote failure ┤
//!                        abort batch ◀── anything else ┘
//! ```
//!
//! The gate runs before any document is touched: without an endpoint and a
//! key nothing is persisted, extracted or sent.
//!
//! Documents go through an ordered `buffered(concurrency)` stream. With the
//! default concurrency of 1 that is strictly one document at a time; higher
//! values overlap the remote calls but results still come back, and are
//! stored, in upload order.

use crate::config::{Credentials, SessionConfig};
use crate::error::{DocumentError, ExtractError};
use crate::pipeline::extract::{PdfiumTextExtractor, TextExtractor};
use crate::pipeline::layout::{FormRecognizerAnalyzer, LayoutAnalyzer};
use crate::pipeline::upload::{self, UploadedDocument};
use crate::session::{DocumentRecord, SessionOutcome, SessionStats, SessionStore};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process one upload batch into a fresh [`SessionOutcome`].
///
/// # Errors
/// Returns `Err(ExtractError)` for fatal errors only:
/// - endpoint or key missing (nothing is processed)
/// - temporary file could not be written
/// - text extraction failed (corrupt PDF, pdfium unavailable)
/// - transport failure talking to the layout service
///
/// A document the layout service rejects is reported in
/// [`SessionOutcome::failures`] and left out of the store.
pub async fn process_uploads(
    uploads: Vec<UploadedDocument>,
    config: &SessionConfig,
) -> Result<SessionOutcome, ExtractError> {
    let start = Instant::now();
    let credentials = config.credentials()?;

    let extractor = resolve_extractor(config);
    let analyzer = resolve_analyzer(config);
    let total = uploads.len();
    info!("Processing {} uploaded document(s)", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_session_start(total);
    }

    let mut results = stream::iter(uploads.into_iter().enumerate().map(|(index, doc)| {
        let extractor = Arc::clone(&extractor);
        let analyzer = Arc::clone(&analyzer);
        let credentials = &credentials;
        async move {
            process_document(index, total, doc, extractor, analyzer, credentials, config).await
        }
    }))
    .buffered(config.concurrency.max(1));

    let mut store = SessionStore::new();
    let mut failures = Vec::new();

    while let Some(result) = results.next().await {
        match result? {
            Ok(record) => {
                let key = store.insert(record);
                debug!("Stored '{}'", key);
            }
            Err(failure) => failures.push(failure),
        }
    }

    let stats = SessionStats {
        documents: total,
        succeeded: store.len(),
        failed: failures.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} documents analysed, {}ms",
        stats.succeeded, stats.documents, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_session_complete(total, stats.succeeded);
    }

    Ok(SessionOutcome {
        store,
        failures,
        stats,
    })
}

/// Read `paths` from disk and process them as one batch.
pub async fn process_paths(
    paths: &[PathBuf],
    config: &SessionConfig,
) -> Result<SessionOutcome, ExtractError> {
    // Fail on configuration before reading anything.
    config.credentials()?;

    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        uploads.push(UploadedDocument::from_path(path).await?);
    }
    process_uploads(uploads, config).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Outer `Err` aborts the batch; inner `Err` is a per-document failure.
async fn process_document(
    index: usize,
    total: usize,
    doc: UploadedDocument,
    extractor: Arc<dyn TextExtractor>,
    analyzer: Arc<dyn LayoutAnalyzer>,
    credentials: &Credentials,
    config: &SessionConfig,
) -> Result<Result<DocumentRecord, DocumentError>, ExtractError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, total, &doc.name);
    }

    let name = doc.name.clone();
    // Dropped on every exit path below, removing the file.
    let temp = upload::persist_blocking(doc, config.temp_dir.clone()).await?;

    let text = extractor.extract_text(temp.path()).await?;
    debug!("'{}': {} chars of text", name, text.chars().count());

    match analyzer.analyze(temp.path(), credentials).await {
        Ok(analysis) => {
            info!(
                "'{}': layout analysed ({} pages)",
                name,
                analysis.page_count()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_complete(index, total, &name);
            }
            Ok(Ok(DocumentRecord {
                file_name: name,
                text,
                analysis,
            }))
        }
        Err(e) => {
            let failure = DocumentError::from_remote(&name, e)?;
            warn!("{}", failure);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(index, total, &name, &failure.to_string());
            }
            Ok(Err(failure))
        }
    }
}

/// Use the configured extractor, else pdfium.
fn resolve_extractor(config: &SessionConfig) -> Arc<dyn TextExtractor> {
    match config.extractor {
        Some(ref extractor) => Arc::clone(extractor),
        None => Arc::new(PdfiumTextExtractor),
    }
}

/// Use the configured analyzer, else the Form Recognizer REST client.
fn resolve_analyzer(config: &SessionConfig) -> Arc<dyn LayoutAnalyzer> {
    match config.analyzer {
        Some(ref analyzer) => Arc::clone(analyzer),
        None => Arc::new(FormRecognizerAnalyzer::from_config(config)),
    }
}
