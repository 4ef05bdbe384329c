//! Local text extraction: every page's plain text, concatenated in order.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. The work runs on Tokio's blocking pool instead.

use crate::error::ExtractError;
use crate::pipeline::pdfium::bind_pdfium;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Turns a persisted PDF into one string of plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Concatenate the text of every page, first page first, no separators.
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// [`TextExtractor`] backed by pdfium.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumTextExtractor;

#[async_trait]
impl TextExtractor for PdfiumTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_text_blocking(&path))
            .await
            .map_err(|e| ExtractError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

/// Blocking implementation of text extraction.
pub fn extract_text_blocking(pdf_path: &Path) -> Result<String, ExtractError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| classify_load_error(pdf_path, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut page_texts = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| ExtractError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        let all = text.all();
        debug!("Page {} → {} chars", idx + 1, all.chars().count());
        page_texts.push(all);
    }

    Ok(concat_pages(page_texts))
}

/// Join page texts in the given order with no added separators.
pub fn concat_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pages.into_iter().fold(String::new(), |mut acc, page| {
        acc.push_str(page.as_ref());
        acc
    })
}

fn classify_load_error(pdf_path: &Path, e: PdfiumError) -> ExtractError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        ExtractError::PasswordRequired {
            path: pdf_path.to_path_buf(),
        }
    } else {
        ExtractError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}
