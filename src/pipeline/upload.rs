//! Upload persistence: copy an uploaded document to a scoped temporary file.
//!
//! pdfium and the layout client both work from a file-system path, so every
//! upload is written to a `NamedTempFile` whose name starts with the
//! document's display name. The file is deleted when the
//! [`TemporaryDocumentFile`] guard drops, on success and on every error path.

use crate::error::ExtractError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Longest display-name prefix kept in a temporary file name.
const MAX_PREFIX_CHARS: usize = 64;

/// Raw bytes of an uploaded document plus its display name.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    /// The uploaded file name, used as the session key.
    pub name: String,
    /// Document contents.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk, named after its final path component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ExtractError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, bytes))
    }
}

/// A filesystem copy of an [`UploadedDocument`], removed on drop.
#[derive(Debug)]
pub struct TemporaryDocumentFile {
    display_name: String,
    file: NamedTempFile,
}

impl TemporaryDocumentFile {
    /// Path of the temporary copy.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The display name the file was created for.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// [`persist`] on the blocking thread pool, so large uploads never stall an
/// async worker.
pub async fn persist_blocking(
    doc: UploadedDocument,
    dir: Option<PathBuf>,
) -> Result<TemporaryDocumentFile, ExtractError> {
    tokio::task::spawn_blocking(move || persist(&doc, dir.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("Persist task panicked: {}", e)))?
}

/// Write `doc` to a new temporary file in `dir` (or the system temp dir).
pub fn persist(
    doc: &UploadedDocument,
    dir: Option<&Path>,
) -> Result<TemporaryDocumentFile, ExtractError> {
    let prefix = format!("{}-", file_name_prefix(&doc.name));
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".pdf");

    let to_err = |source: std::io::Error| ExtractError::TempFile {
        name: doc.name.clone(),
        source,
    };

    let mut file = match dir {
        Some(d) => builder.tempfile_in(d),
        None => builder.tempfile(),
    }
    .map_err(to_err)?;

    file.write_all(&doc.bytes).map_err(to_err)?;
    file.flush().map_err(to_err)?;

    debug!(
        "Persisted '{}' ({} bytes) to {}",
        doc.name,
        doc.bytes.len(),
        file.path().display()
    );

    Ok(TemporaryDocumentFile {
        display_name: doc.name.clone(),
        file,
    })
}

/// Reduce a display name to something safe to embed in a file name.
///
/// Directory components are dropped and anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn file_name_prefix(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_PREFIX_CHARS)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
