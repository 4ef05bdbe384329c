//! Progress-callback trait for per-document session events.
//!
//! Inject an [`Arc<dyn SessionProgressCallback>`] via
//! [`crate::config::SessionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks through an upload batch. The CLI drives
//! an `indicatif` bar from it; the web server relies on `tracing` instead.
//!
//! # Example
//!
//! ```rust
//! use idmp_extract::{SessionConfig, SessionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     analysed: AtomicUsize,
//! }
//!
//! impl SessionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, name: &str) {
//!         self.analysed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {}", index + 1, total, name);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { analysed: AtomicUsize::new(0) });
//! let config = SessionConfig::builder()
//!     .progress_callback(cb as Arc<dyn SessionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each uploaded document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is the 0-based upload position.
///
/// # Thread safety
///
/// With `concurrency > 1`, `on_document_start`, `on_document_complete` and
/// `on_document_error` may be called from different tasks at once.
pub trait SessionProgressCallback: Send + Sync {
    /// Called once before the first document is persisted.
    fn on_session_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document is written to its temporary file.
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a document was extracted and analysed.
    fn on_document_complete(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when the layout service rejected a document.
    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every document has been attempted.
    fn on_session_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl SessionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SessionConfig`].
pub type ProgressCallback = Arc<dyn SessionProgressCallback>;
