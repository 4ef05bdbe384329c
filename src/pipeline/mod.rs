//! Pipeline stages for one uploaded document.
//!
//! Each submodule implements exactly one step so it can be tested and
//! swapped on its own (the orchestrator only sees the traits).
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ extract ──▶ layout
//! (tempfile)  (pdfium)   (Form Recognizer)
//! ```
//!
//! 1. [`upload`]  — persist the uploaded bytes to a scoped temporary file
//! 2. [`extract`] — concatenate every page's plain text; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`layout`]  — submit the file to `prebuilt-layout` and poll the
//!    long-running operation; the only stage with network I/O
//!
//! [`pdfium`] holds the library binding shared by the extractor.

pub mod extract;
pub mod layout;
pub mod pdfium;
pub mod upload;
