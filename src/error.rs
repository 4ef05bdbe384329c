//! Error types for the idmp-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the current batch cannot proceed
//!   (configuration missing, corrupt PDF, temp file could not be written,
//!   network transport failure). Returned as `Err(ExtractError)` from
//!   [`crate::process::process_uploads`].
//!
//! * [`DocumentError`] — **Non-fatal**: the layout service rejected one
//!   document but the rest of the batch is fine. Collected in
//!   [`crate::session::SessionOutcome::failures`] so callers can show an
//!   inline message while the document stays out of the selector.
//!
//! The remote service's own failure travels as
//! [`ExtractError::RemoteRequestFailed`] out of the analyzer; the
//! orchestrator is the only place that downgrades it to a [`DocumentError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the idmp-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Configuration errors ─────────────────────────────────────────────
    /// Endpoint or key is empty; nothing is processed.
    #[error(
        "Azure Form Recognizer configuration is missing ({missing}).\n\
Set FORM_RECOGNIZER_ENDPOINT and FORM_RECOGNIZER_KEY environment variables."
    )]
    MissingConfiguration { missing: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The uploaded bytes could not be persisted to a temporary file.
    #[error("Failed to write temporary file for '{name}': {source}")]
    TempFile {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O failure while reading a persisted document.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDFium could not parse the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), place the\n\
library next to the executable, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Layout service errors ─────────────────────────────────────────────
    /// The layout service answered with an error.
    ///
    /// `status` is the HTTP status when the failure came from a response
    /// code; `None` when an accepted operation later reported `failed`.
    #[error("{}", remote_message(*status, code.as_deref(), message))]
    RemoteRequestFailed {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Request never produced a response (DNS, connect, timeout, body read).
    #[error("Transport error talking to '{url}': {detail}")]
    Transport { url: String, detail: String },

    // ── Word cloud errors ─────────────────────────────────────────────────
    /// Nothing left to draw after tokenising and removing stop-words.
    #[error("We need at least 1 word to plot a word cloud, got 0")]
    NoWords,

    /// PNG encoding of the rendered word cloud failed.
    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// `true` for the one failure the orchestrator handles per document.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, ExtractError::RemoteRequestFailed { .. })
    }
}

fn remote_message(status: Option<u16>, code: Option<&str>, message: &str) -> String {
    let mut out = String::from("(");
    match (status, code) {
        (Some(s), Some(c)) => out.push_str(&format!("{c}) status {s}")),
        (Some(s), None) => out.push_str(&format!("{s})")),
        (None, Some(c)) => out.push_str(&format!("{c})")),
        (None, None) => out.push_str("Unknown)"),
    }
    out.push(' ');
    out.push_str(message);
    out
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::session::SessionOutcome::failures`]. The batch
/// continues with the next upload.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// Remote layout analysis failed for this document.
    #[error("Error analyzing document '{file_name}': {}", remote_message(*status, code.as_deref(), message))]
    AnalysisFailed {
        file_name: String,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
}

impl DocumentError {
    /// Display name of the document that failed.
    pub fn file_name(&self) -> &str {
        match self {
            DocumentError::AnalysisFailed { file_name, .. } => file_name,
        }
    }

    /// Downgrade a remote failure into a per-document error.
    ///
    /// Every other variant is handed back unchanged.
    pub fn from_remote(file_name: &str, err: ExtractError) -> Result<Self, ExtractError> {
        match err {
            ExtractError::RemoteRequestFailed {
                status,
                code,
                message,
            } => Ok(DocumentError::AnalysisFailed {
                file_name: file_name.to_string(),
                status,
                code,
                message,
            }),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_mentions_env_vars() {
        let e = ExtractError::MissingConfiguration { missing: "key" };
        let msg = e.to_string();
        assert!(msg.contains("FORM_RECOGNIZER_ENDPOINT"), "got: {msg}");
        assert!(msg.contains("(key)"));
    }

    #[test]
    fn remote_failure_display_with_status_and_code() {
        let e = ExtractError::RemoteRequestFailed {
            status: Some(401),
            code: Some("401".into()),
            message: "Access denied due to invalid subscription key.".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("status 401"), "got: {msg}");
        assert!(msg.contains("invalid subscription key"));
    }

    #[test]
    fn remote_failure_display_without_status() {
        let e = ExtractError::RemoteRequestFailed {
            status: None,
            code: Some("InvalidContent".into()),
            message: "The file is corrupted or format is unsupported.".into(),
        };
        assert!(e.to_string().starts_with("(InvalidContent)"));
    }

    #[test]
    fn from_remote_downgrades_only_remote_failures() {
        let remote = ExtractError::RemoteRequestFailed {
            status: Some(400),
            code: None,
            message: "bad".into(),
        };
        let doc = DocumentError::from_remote("b.pdf", remote).expect("downgraded");
        assert_eq!(doc.file_name(), "b.pdf");
        assert!(doc.to_string().contains("b.pdf"));

        let fatal = ExtractError::Transport {
            url: "https://x".into(),
            detail: "timed out".into(),
        };
        let back = DocumentError::from_remote("b.pdf", fatal).unwrap_err();
        assert!(matches!(back, ExtractError::Transport { .. }));
    }

    #[test]
    fn no_words_display() {
        assert!(ExtractError::NoWords.to_string().contains("got 0"));
    }
}
