//! Per-batch document store.
//!
//! A [`SessionStore`] is rebuilt from scratch for every upload batch. Keys are
//! display names in upload order; a repeated name is stored as `name (2)`,
//! `name (3)`, … so no record is silently replaced.

use crate::error::DocumentError;
use crate::pipeline::layout::LayoutAnalysisResult;
use crate::pipeline::upload::file_name_prefix;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Everything kept for one successfully analysed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Uploaded file name (before any collision suffix).
    pub file_name: String,
    /// Plain text of every page, concatenated in page order.
    pub text: String,
    /// Structured layout from the remote service.
    pub analysis: LayoutAnalysisResult,
}

/// Insertion-ordered `key → DocumentRecord` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStore {
    records: IndexMap<String, DocumentRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under its file name and return the key actually used.
    pub fn insert(&mut self, record: DocumentRecord) -> String {
        let key = self.free_key(&record.file_name);
        self.records.insert(key.clone(), record);
        key
    }

    fn free_key(&self, name: &str) -> String {
        if !self.records.contains_key(name) {
            return name.to_string();
        }
        (2..)
            .map(|n| format!("{name} ({n})"))
            .find(|candidate| !self.records.contains_key(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&DocumentRecord> {
        self.records.get(key)
    }

    /// Keys in upload order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn first_key(&self) -> Option<&str> {
        self.records.keys().next().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// File-system stems for exporting every record, in key order.
    ///
    /// The `.pdf` extension is dropped and the rest sanitised; stems that
    /// would collide (case-insensitively) get `-2`, `-3`, … appended.
    pub fn export_stems(&self) -> Vec<(&str, String)> {
        let mut taken = std::collections::HashSet::new();
        self.keys()
            .map(|key| {
                let base = file_name_prefix(&strip_pdf_extension(key));
                let stem = (1..)
                    .map(|n| match n {
                        1 => base.clone(),
                        n => format!("{base}-{n}"),
                    })
                    .find(|candidate| taken.insert(candidate.to_lowercase()))
                    .unwrap_or_else(|| base.clone());
                (key, stem)
            })
            .collect()
    }
}

/// `report.pdf` → `report`, `report.pdf (2)` → `report (2)`.
fn strip_pdf_extension(key: &str) -> String {
    match key.to_ascii_lowercase().rfind(".pdf") {
        Some(at) => format!("{}{}", &key[..at], &key[at + 4..]),
        None => key.to_string(),
    }
}

/// Batch-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Documents in the batch.
    pub documents: usize,
    /// Documents that produced a record.
    pub succeeded: usize,
    /// Documents rejected by the layout service.
    pub failed: usize,
    /// Wall-clock duration of the batch.
    pub duration_ms: u64,
}

/// Result of one upload batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionOutcome {
    pub store: SessionStore,
    /// Per-document failures, in upload order.
    pub failures: Vec<DocumentError>,
    pub stats: SessionStats,
}
