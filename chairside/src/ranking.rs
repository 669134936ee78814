//! Weighted substring/prefix scoring.
//!
//! Scores are additive integers so rankings are comparable across runs and
//! easy to assert on. Field substring tests also report which fields matched,
//! for highlighting; that set never feeds back into the score.

use std::collections::BTreeSet;

use crate::indexer::{IndexEntry, IndexedField};
use crate::interface::FieldRole;

/// Primary field contains the query
pub const PRIMARY_SUBSTRING: u32 = 100;
/// Primary field starts with the query (on top of the substring weight)
pub const PRIMARY_PREFIX: u32 = 50;
/// Query token is a prefix of a primary token
pub const PRIMARY_TOKEN_PREFIX: u32 = 30;
/// Query token is inside (but not a prefix of) a primary token
pub const PRIMARY_TOKEN_SUBSTRING: u32 = 15;

pub const SECONDARY_SUBSTRING: u32 = 80;
pub const SECONDARY_PREFIX: u32 = 40;
pub const SECONDARY_TOKEN_PREFIX: u32 = 25;
pub const SECONDARY_TOKEN_SUBSTRING: u32 = 10;

pub const TERTIARY_SUBSTRING: u32 = 40;
pub const QUATERNARY_SUBSTRING: u32 = 20;

/// Catch-all over the whole searchable text
pub const SEARCHABLE_TEXT_SUBSTRING: u32 = 10;

/// A query normalized once per search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    text: String,
    tokens: Vec<String>,
}

impl PreparedQuery {
    pub fn new(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        let tokens = text.split_whitespace().map(str::to_string).collect();
        Self { text, tokens }
    }

    /// Whitespace-only queries match everything with score 0
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Score plus the names of fields whose substring test passed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: u32,
    pub matched_fields: BTreeSet<String>,
}

struct FieldWeights {
    substring: u32,
    prefix: u32,
    token_prefix: u32,
    token_substring: u32,
}

const fn weights(role: FieldRole) -> FieldWeights {
    match role {
        FieldRole::Primary => FieldWeights {
            substring: PRIMARY_SUBSTRING,
            prefix: PRIMARY_PREFIX,
            token_prefix: PRIMARY_TOKEN_PREFIX,
            token_substring: PRIMARY_TOKEN_SUBSTRING,
        },
        FieldRole::Secondary => FieldWeights {
            substring: SECONDARY_SUBSTRING,
            prefix: SECONDARY_PREFIX,
            token_prefix: SECONDARY_TOKEN_PREFIX,
            token_substring: SECONDARY_TOKEN_SUBSTRING,
        },
        FieldRole::Tertiary => FieldWeights {
            substring: TERTIARY_SUBSTRING,
            prefix: 0,
            token_prefix: 0,
            token_substring: 0,
        },
        FieldRole::Quaternary => FieldWeights {
            substring: QUATERNARY_SUBSTRING,
            prefix: 0,
            token_prefix: 0,
            token_substring: 0,
        },
    }
}

/// Token pairs run over the full cross product, so repeated matches add up.
fn token_score(query_tokens: &[String], field: &IndexedField, w: &FieldWeights) -> u32 {
    if w.token_prefix == 0 && w.token_substring == 0 {
        return 0;
    }
    let mut score = 0;
    for qt in query_tokens {
        for ft in &field.tokens {
            if ft.starts_with(qt.as_str()) {
                score += w.token_prefix;
            } else if ft.contains(qt.as_str()) {
                score += w.token_substring;
            }
        }
    }
    score
}

/// Score one entry against a prepared query.
pub fn score_entry(entry: &IndexEntry, query: &PreparedQuery) -> ScoreBreakdown {
    if query.is_empty() {
        return ScoreBreakdown::default();
    }

    let mut scored = ScoreBreakdown::default();
    for role in FieldRole::ALL {
        let Some(field) = entry.field(role) else {
            continue;
        };
        let w = weights(role);
        if field.text.contains(query.text()) {
            scored.score += w.substring;
            scored.matched_fields.insert(field.name.clone());
            if field.text.starts_with(query.text()) {
                scored.score += w.prefix;
            }
        }
        scored.score += token_score(query.tokens(), field, &w);
    }

    if entry.searchable_text.contains(query.text()) {
        scored.score += SEARCHABLE_TEXT_SUBSTRING;
    }
    scored
}

/// Relevance of `entry` for a raw query string
pub fn score(entry: &IndexEntry, query: &str) -> ScoreBreakdown {
    score_entry(entry, &PreparedQuery::new(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldExtractor;

    struct Rec {
        name: &'static str,
        phone: &'static str,
        email: &'static str,
        address: &'static str,
    }

    fn entry(name: &'static str, phone: &'static str, email: &'static str, address: &'static str) -> IndexEntry {
        let fx = FieldExtractor::new(|r: &Rec| r.name.to_string())
            .primary("name", |r| r.name.to_string())
            .secondary("phone", |r| r.phone.to_string())
            .tertiary("email", |r| r.email.to_string())
            .quaternary("address", |r| r.address.to_string());
        IndexEntry::from_record(&Rec { name, phone, email, address }, &fx)
    }

    #[test]
    fn test_primary_prefix_scores() {
        // 100 substring + 50 prefix + 30 token prefix + 10 catch-all
        let e = entry("Ahmad Ali", "", "", "");
        assert_eq!(score(&e, "ahmad").score, 190);
    }

    #[test]
    fn test_primary_substring_only_scores() {
        // 100 substring + 30 ("ahmad" is a prefix of the second token) + 10
        let e = entry("Sara Ahmad", "", "", "");
        assert_eq!(score(&e, "ahmad").score, 140);
    }

    #[test]
    fn test_token_inner_substring() {
        // "hma" inside "ahmad": 100 + 15 + 10
        let e = entry("Ahmad", "", "", "");
        assert_eq!(score(&e, "hma").score, 125);
    }

    #[test]
    fn test_token_cross_product_accumulates() {
        // Query tokens "a" and "al" against "ali" and "alia":
        // "a" prefixes both (2 x 30), "al" prefixes both (2 x 30)
        // plus whole-query "a al" is not a substring of "ali alia"
        let e = entry("Ali Alia", "", "", "");
        assert_eq!(score(&e, "a al").score, 120);
    }

    #[test]
    fn test_secondary_weights() {
        // 80 substring + 40 prefix + 25 token prefix + 10 catch-all
        let e = entry("Lina", "0791234567", "", "");
        assert_eq!(score(&e, "0791").score, 155);
        // 80 + 10 token substring + 10
        assert_eq!(score(&e, "1234").score, 100);
    }

    #[test]
    fn test_tertiary_and_quaternary_weights() {
        let e = entry("Lina", "", "lina.k@example.com", "3 Hill Ave Zarqa");
        // email: 40 + catch-all 10
        assert_eq!(score(&e, "example").score, 50);
        // address: 20 + catch-all 10
        assert_eq!(score(&e, "zarqa").score, 30);
    }

    #[test]
    fn test_matched_fields_reports_substring_hits_only() {
        let e = entry("Ali Hassan", "0787654321", "ali.hassan@example.com", "4 Garden Rd");
        let s = score_entry(&e, &PreparedQuery::new("ali"));
        let fields: Vec<&str> = s.matched_fields.iter().map(String::as_str).collect();
        assert_eq!(fields, vec!["email", "name"]);
    }

    #[test]
    fn test_score_returns_full_breakdown() {
        let e = entry("Sara Ahmad", "0771112233", "sara@example.com", "Irbid");
        let breakdown = score(&e, "  Sara ");
        assert_eq!(breakdown, score_entry(&e, &PreparedQuery::new("sara")));
        assert!(breakdown.matched_fields.contains("name"));
        assert!(breakdown.matched_fields.contains("email"));
        assert!(!breakdown.matched_fields.contains("phone"));
    }

    #[test]
    fn test_no_match_scores_zero() {
        let e = entry("Ali Hassan", "", "", "");
        assert_eq!(score(&e, "ahmad").score, 0);
        assert_eq!(score(&e, "   ").score, 0);
    }

    #[test]
    fn test_prefix_bonus_is_additive() {
        let prefix = entry("Ahmadi", "", "", "");
        let inner = entry("Xahmadi", "", "", "");
        let q = "ahmad";
        // same token shape except the prefix bonus and token prefix vs token substring
        assert_eq!(score(&prefix, q).score, PRIMARY_SUBSTRING + PRIMARY_PREFIX + PRIMARY_TOKEN_PREFIX + SEARCHABLE_TEXT_SUBSTRING);
        assert_eq!(score(&inner, q).score, PRIMARY_SUBSTRING + PRIMARY_TOKEN_SUBSTRING + SEARCHABLE_TEXT_SUBSTRING);
        assert!(score(&prefix, q).score > score(&inner, q).score);
    }

    #[test]
    fn test_query_is_case_insensitive_and_trimmed() {
        let e = entry("Ahmad Ali", "", "", "");
        assert_eq!(score(&e, "  AHMAD ").score, score(&e, "ahmad").score);
    }
}
