//! Search over an index snapshot: score, filter, sort, truncate.
//!
//! Large collections are scored on the rayon pool with cancellation checks,
//! then put back into index order so equal scores keep their original
//! relative order under the stable sort that follows.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::indexer::IndexEntry;
use crate::interface::{ChairsideError, MatchResult, Result, SortBy};
use crate::ranking::{score_entry, PreparedQuery, ScoreBreakdown};

/// Default cap on returned results
pub const DEFAULT_MAX_RESULTS: usize = 50;
/// Default minimum score for a record to be included
pub const DEFAULT_MIN_SCORE: u32 = 5;

/// Collections at least this large are scored in parallel.
const PARALLEL_SCORE_THRESHOLD: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_score: u32,
    pub sort_by: SortBy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            min_score: DEFAULT_MIN_SCORE,
            sort_by: SortBy::Relevance,
        }
    }
}

/// Search `records` through their index `entries`.
///
/// `entries[i]` must have been built from `records[i]`.
pub fn search<'a, T: Sync>(
    entries: &[IndexEntry],
    records: &'a [T],
    query: &str,
    options: &SearchOptions,
) -> Vec<MatchResult<'a, T>> {
    // A fresh token is never cancelled, so this cannot fail
    search_interruptible(entries, records, query, options, &CancellationToken::new())
        .unwrap_or_default()
}

/// Same as [`search`], but gives up with `Cancelled` once `token` fires.
pub fn search_interruptible<'a, T: Sync>(
    entries: &[IndexEntry],
    records: &'a [T],
    query: &str,
    options: &SearchOptions,
    token: &CancellationToken,
) -> Result<Vec<MatchResult<'a, T>>> {
    debug_assert_eq!(entries.len(), records.len(), "index out of sync with records");
    if token.is_cancelled() {
        return Err(ChairsideError::Cancelled);
    }

    let query = PreparedQuery::new(query);
    let mut hits = if query.is_empty() {
        // Passthrough: everything, score 0
        (0..entries.len()).map(|i| (i, ScoreBreakdown::default())).collect()
    } else {
        score_all(entries, &query, options.min_score, token)
    };

    if token.is_cancelled() {
        return Err(ChairsideError::Cancelled);
    }

    sort_hits(&mut hits, entries, options.sort_by);
    hits.truncate(options.max_results);

    Ok(hits
        .into_iter()
        .map(|(i, scored)| MatchResult {
            record: &records[i],
            score: scored.score,
            matched_fields: scored.matched_fields,
        })
        .collect())
}

fn score_all(
    entries: &[IndexEntry],
    query: &PreparedQuery,
    min_score: u32,
    token: &CancellationToken,
) -> Vec<(usize, ScoreBreakdown)> {
    let keep = |(i, e): (usize, &IndexEntry)| {
        let scored = score_entry(e, query);
        (scored.score >= min_score).then_some((i, scored))
    };

    if entries.len() < PARALLEL_SCORE_THRESHOLD {
        return entries.iter().enumerate().filter_map(keep).collect();
    }

    let mut hits: Vec<(usize, ScoreBreakdown)> = entries
        .par_iter()
        .enumerate()
        .take_any_while(|_| !token.is_cancelled())
        .filter_map(keep)
        .collect();
    // take_any_while doesn't preserve order; restore index order
    hits.sort_unstable_by_key(|(i, _)| *i);
    hits
}

/// Stable sort, so ties keep index order.
fn sort_hits(hits: &mut [(usize, ScoreBreakdown)], entries: &[IndexEntry], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => hits.sort_by(|a, b| b.1.score.cmp(&a.1.score)),
        SortBy::Name => hits.sort_by(|a, b| entries[a.0].primary_text().cmp(entries[b.0].primary_text())),
        SortBy::Recent => hits.sort_by(|a, b| {
            let ta = entries[a.0].created_at.unwrap_or(0);
            let tb = entries[b.0].created_at.unwrap_or(0);
            tb.cmp(&ta)
        }),
    }
}
