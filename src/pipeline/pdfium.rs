//! PDFium library binding.
//!
//! `pdfium-render` loads libpdfium dynamically at runtime. Resolution order
//! (first match wins):
//!
//! 1. `PDFIUM_LIB_PATH` — a library file, or a directory containing the
//!    platform library (`libpdfium.so` / `libpdfium.dylib` / `pdfium.dll`)
//! 2. the directory of the running executable
//! 3. the current working directory
//! 4. the system library search path
//!
//! When `PDFIUM_LIB_PATH` is set it is authoritative: a bad path is an error
//! rather than a silent fallback to some other copy.

use crate::error::ExtractError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at an existing pdfium library.
pub const ENV_PDFIUM_LIB_PATH: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library following the resolution order above.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(configured) = std::env::var(ENV_PDFIUM_LIB_PATH) {
        if !configured.trim().is_empty() {
            let lib = library_path(Path::new(configured.trim()));
            debug!("Binding pdfium from {}={}", ENV_PDFIUM_LIB_PATH, lib.display());
            let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
                ExtractError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        candidates.push(library_path(&exe_dir));
    }
    candidates.push(library_path(Path::new("./")));

    for lib in &candidates {
        if !lib.exists() {
            continue;
        }
        match Pdfium::bind_to_library(lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!("pdfium at {} unusable: {:?}", lib.display(), e),
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    debug!("Bound system pdfium library");
    Ok(Pdfium::new(bindings))
}

/// A directory expands to the platform library inside it; a file is used as-is.
fn library_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(path))
    } else {
        path.to_path_buf()
    }
}
