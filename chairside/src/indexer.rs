//! Search index builder
//!
//! Turns a record snapshot into lower-cased, tokenized entries once per
//! snapshot. There is no incremental patching: a new snapshot `Arc` means a
//! full rebuild, which is cheap next to UI refresh cadence for clinic-sized
//! collections.

use std::sync::Arc;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::interface::{FieldRole, MatchResult, Result};
use crate::models::FieldExtractor;
use crate::search::{self, SearchOptions};

/// Collections at least this large are indexed on the rayon pool.
const PARALLEL_BUILD_THRESHOLD: usize = 2_000;

/// One searchable field of an entry, lower-cased and tokenized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedField {
    pub name: String,
    pub text: String,
    pub tokens: Vec<String>,
}

/// Precomputed representation of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    /// Lower-cased, space-joined text of every non-empty field
    pub searchable_text: String,
    pub created_at: Option<i64>,
    fields: [Option<IndexedField>; 4],
}

impl IndexEntry {
    pub fn from_record<T>(record: &T, extractor: &FieldExtractor<T>) -> Self {
        let mut fields: [Option<IndexedField>; 4] = [None, None, None, None];
        let mut parts: Vec<String> = Vec::with_capacity(4);

        for field in extractor.fields() {
            let text = field.extract(record).to_lowercase();
            if text.trim().is_empty() {
                continue;
            }
            parts.push(text.clone());
            fields[field.role().slot()] = Some(IndexedField {
                name: field.name().to_string(),
                tokens: tokenize(&text),
                text,
            });
        }

        Self {
            id: extractor.id_of(record),
            searchable_text: parts.join(" "),
            created_at: extractor.created_at_of(record),
            fields,
        }
    }

    pub fn field(&self, role: FieldRole) -> Option<&IndexedField> {
        self.fields[role.slot()].as_ref()
    }

    /// Lower-cased primary text, empty when the record has none
    pub fn primary_text(&self) -> &str {
        self.field(FieldRole::Primary).map_or("", |f| f.text.as_str())
    }
}

/// Split on whitespace, dropping empty tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Build one entry per record, preserving order.
pub fn build_index<T: Sync>(records: &[T], extractor: &FieldExtractor<T>) -> Vec<IndexEntry> {
    if records.len() >= PARALLEL_BUILD_THRESHOLD {
        // Indexed parallel collect keeps input order
        records
            .par_iter()
            .map(|r| IndexEntry::from_record(r, extractor))
            .collect()
    } else {
        records
            .iter()
            .map(|r| IndexEntry::from_record(r, extractor))
            .collect()
    }
}

/// A record snapshot together with the entries built from it
pub struct SearchIndex<T> {
    source: Arc<Vec<T>>,
    entries: Vec<IndexEntry>,
}

impl<T: Sync> SearchIndex<T> {
    pub fn build(source: Arc<Vec<T>>, extractor: &FieldExtractor<T>) -> Self {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let entries = build_index(&source, extractor);

        #[cfg(feature = "perf-log")]
        tracing::debug!(
            records = entries.len(),
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            "[perf] index build"
        );
        tracing::debug!(records = entries.len(), "search index rebuilt");

        Self { source, entries }
    }
}

impl<T> SearchIndex<T> {
    /// True when this index was built from exactly this snapshot
    pub fn is_built_from(&self, snapshot: &Arc<Vec<T>>) -> bool {
        Arc::ptr_eq(&self.source, snapshot)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn records(&self) -> &[T] {
        &self.source
    }

    pub fn source(&self) -> &Arc<Vec<T>> {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Sync> SearchIndex<T> {
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<MatchResult<'_, T>> {
        search::search(&self.entries, &self.source, query, options)
    }

    pub(crate) fn search_interruptible(
        &self,
        query: &str,
        options: &SearchOptions,
        token: &CancellationToken,
    ) -> Result<Vec<MatchResult<'_, T>>> {
        search::search_interruptible(&self.entries, &self.source, query, options, token)
    }
}
