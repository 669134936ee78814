//! Chairside public interface definition
//!
//! Shared types consumed by the UI layer: sort modes, field roles, match
//! results, the crate error, and the record source contract.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result ordering for `search`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Descending score; equal scores keep index order
    #[default]
    Relevance,
    /// Primary field, ascending
    Name,
    /// Descending creation timestamp, missing timestamps sort as epoch 0
    Recent,
}

/// Which scoring rules a searchable field participates in.
///
/// Roles map to the name / contact / email / address columns of the clinic
/// screens but carry no domain meaning of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldRole {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
}

impl FieldRole {
    pub const ALL: [FieldRole; 4] = [
        FieldRole::Primary,
        FieldRole::Secondary,
        FieldRole::Tertiary,
        FieldRole::Quaternary,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            FieldRole::Primary => 0,
            FieldRole::Secondary => 1,
            FieldRole::Tertiary => 2,
            FieldRole::Quaternary => 3,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// One search hit. Borrowed from the snapshot it was computed against.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a, T> {
    pub record: &'a T,
    pub score: u32,
    /// Names of the fields whose substring test passed, for highlighting
    pub matched_fields: BTreeSet<String>,
}

/// Owned variant of [`MatchResult`] for results that cross a task boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedMatch<T> {
    pub record: T,
    pub score: u32,
    pub matched_fields: BTreeSet<String>,
}

impl<T: Clone> From<MatchResult<'_, T>> for OwnedMatch<T> {
    fn from(m: MatchResult<'_, T>) -> Self {
        OwnedMatch {
            record: m.record.clone(),
            score: m.score,
            matched_fields: m.matched_fields,
        }
    }
}

/// Error type for Chairside operations
#[derive(Debug, Error)]
pub enum ChairsideError {
    #[error("Invalid list geometry: {0}")]
    InvalidGeometry(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Background worker error: {0}")]
    Worker(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChairsideError>;

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Supplies record collections to the core.
///
/// A snapshot with a new `Arc` identity is treated as potentially changed;
/// no deep comparison is done.
pub trait RecordSource<T>: Send + Sync {
    fn snapshot(&self) -> Arc<Vec<T>>;
}

/// In-memory record source with replace-on-write semantics.
pub struct SharedSource<T> {
    records: RwLock<Arc<Vec<T>>>,
}

impl<T> SharedSource<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: RwLock::new(Arc::new(records)),
        }
    }

    /// Replace the collection. Readers holding the old snapshot keep it.
    pub fn replace(&self, records: Vec<T>) {
        *self.records.write() = Arc::new(records);
    }

    /// Copy-on-write edit of the current collection
    pub fn update(&self, edit: impl FnOnce(&mut Vec<T>))
    where
        T: Clone,
    {
        let mut guard = self.records.write();
        let mut next = guard.as_ref().clone();
        edit(&mut next);
        *guard = Arc::new(next);
    }
}

impl<T: Send + Sync> RecordSource<T> for SharedSource<T> {
    fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.records.read())
    }
}
