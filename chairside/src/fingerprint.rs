//! Order-independent content fingerprints for cache invalidation.
//!
//! Each dependency item contributes a summary string; summaries are sorted,
//! joined and folded into a wrapping 32-bit `hash * 31 + unit` accumulator
//! over UTF-16 code units. Cheap, not collision resistant.

use std::fmt;

/// Per-item summary feeding a fingerprint, e.g. `id-parentId-date-status`
pub trait Summarize {
    fn summary(&self) -> String;
}

impl<S: Summarize + ?Sized> Summarize for &S {
    fn summary(&self) -> String {
        (**self).summary()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Sentinel for an empty collection
    Empty,
    Hash(i32),
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Empty => f.write_str("empty"),
            Fingerprint::Hash(h) => write!(f, "{}", h),
        }
    }
}

const SUMMARY_SEPARATOR: &str = "|";

pub fn fingerprint<I: Summarize>(items: &[I]) -> Fingerprint {
    fingerprint_summaries(items.iter().map(Summarize::summary).collect())
}

pub fn fingerprint_summaries(mut summaries: Vec<String>) -> Fingerprint {
    if summaries.is_empty() {
        return Fingerprint::Empty;
    }
    summaries.sort_unstable();
    Fingerprint::Hash(fold_hash(&summaries.join(SUMMARY_SEPARATOR)))
}

fn fold_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}
