//! # idmp-extract
//!
//! Upload PDF documents, run Azure Form Recognizer `prebuilt-layout`
//! analysis on each one, and browse a word cloud plus the extracted text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads (name + bytes)
//!  │
//!  ├─ 0. Gate     endpoint and key present, else nothing runs
//!  ├─ 1. Persist  scoped temporary .pdf file per upload
//!  ├─ 2. Extract  page text via pdfium (spawn_blocking), concatenated in order
//!  ├─ 3. Analyze  POST to Form Recognizer, poll the operation until done
//!  └─ 4. Store    record keyed by file name; rejected documents become
//!                 per-document errors and the batch carries on
//!
//! selected record ──▶ word cloud (800x400 PNG) + extracted text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idmp_extract::{generate_wordcloud, process_paths, SessionConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // FORM_RECOGNIZER_ENDPOINT / FORM_RECOGNIZER_KEY
//!     let config = SessionConfig::from_env();
//!     let outcome = process_paths(&[PathBuf::from("label.pdf")], &config).await?;
//!     for (key, record) in outcome.store.iter() {
//!         let cloud = generate_wordcloud(&record.text, &config.wordcloud)?;
//!         std::fs::write(format!("{key}.png"), cloud.to_png()?)?;
//!     }
//!     for failure in &outcome.failures {
//!         eprintln!("{failure}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum web UI ([`server`]) |
//! | `cli`    | on      | Enables the `idmp-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable both when using only the library:
//! ```toml
//! idmp-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod stopwords;
pub mod wordcloud;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Credentials, SessionConfig, SessionConfigBuilder};
pub use error::{DocumentError, ExtractError};
pub use pipeline::extract::{PdfiumTextExtractor, TextExtractor};
pub use pipeline::layout::{FormRecognizerAnalyzer, LayoutAnalysisResult, LayoutAnalyzer};
pub use pipeline::upload::UploadedDocument;
pub use process::{process_paths, process_uploads};
pub use progress::{NoopProgressCallback, ProgressCallback, SessionProgressCallback};
#[cfg(feature = "server")]
pub use server::{router, serve, AppState};
pub use session::{DocumentRecord, SessionOutcome, SessionStats, SessionStore};
pub use wordcloud::{generate_wordcloud, word_frequencies, WordCloud, WordCloudConfig};
