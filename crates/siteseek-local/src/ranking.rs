//! Lexical term-frequency ranking shared by the page and site indexers.
//!
//! Score of an entry for a query: for every whitespace token,
//! `occurrences(text_lower, token) * (chars(token) + 1)`, summed. Longer tokens
//! and repeated matches both weigh more. No stemming, no IDF.

use crate::text;
use siteseek_core::{IndexEntry, IndexHit};
use std::collections::HashSet;

pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

pub fn score(entry: &IndexEntry, tokens: &[String]) -> u64 {
    tokens
        .iter()
        .map(|t| {
            let n = text::count_occurrences(entry.text_lower(), t) as u64;
            n * (t.chars().count() as u64 + 1)
        })
        .sum()
}

/// Rank `entries` for `query`, best first.
///
/// Ties keep index order (the sort is stable). Entries with score 0 are dropped.
pub fn rank(entries: &[IndexEntry], query: &str, max_results: usize) -> Vec<IndexHit> {
    let tokens = tokenize(query);
    if tokens.is_empty() || max_results == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(u64, &IndexEntry)> = entries
        .iter()
        .map(|e| (score(e, &tokens), e))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(max_results)
        .map(|(score, e)| IndexHit {
            title: e.title.clone(),
            url: e.url.clone(),
            snippet: text::extract_snippet(&e.text, &tokens),
            score,
        })
        .collect()
}

/// Drop entries whose first 200 characters repeat an earlier entry's.
pub fn dedupe_entries(entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, text: &str) -> IndexEntry {
        IndexEntry::new(title.to_string(), format!("/#{title}"), text.to_string())
    }

    #[test]
    fn score_weights_length_and_count() {
        let e = entry("a", "The quick brown fox jumps");
        assert_eq!(score(&e, &tokenize("fox")), 4);
        assert_eq!(score(&e, &tokenize("FOX quick")), 4 + 6);
        let twice = entry("b", "fox fox");
        assert_eq!(score(&twice, &tokenize("fox")), 8);
    }

    #[test]
    fn rank_is_descending_and_stable() {
        let entries = vec![
            entry("one", "alpha"),
            entry("two", "alpha alpha"),
            entry("three", "alpha beta"),
            entry("four", "nothing here"),
        ];
        let hits = rank(&entries, "alpha", 10);
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one", "three"]);
        for w in hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn rank_truncates_and_handles_blank_queries() {
        let entries = vec![entry("one", "x y"), entry("two", "x z")];
        assert_eq!(rank(&entries, "x", 1).len(), 1);
        assert!(rank(&entries, "   ", 5).is_empty());
        assert!(rank(&entries, "x", 0).is_empty());
    }

    #[test]
    fn dedupe_keeps_first_of_shared_prefix() {
        let long = "p".repeat(200);
        let entries = vec![
            entry("first", &format!("{long} tail one")),
            entry("second", &format!("{long} tail two")),
            entry("third", "different"),
        ];
        let out = dedupe_entries(entries);
        let titles: Vec<_> = out.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "third"]);
    }
}
