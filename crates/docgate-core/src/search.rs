//! Full-text matching used by the in-memory [`SearchIndex`](crate::store::SearchIndex).
//!
//! # Matching
//!
//! 1. The query is lower-cased and split on whitespace into terms.
//! 2. A document's score is the number of terms contained (substring,
//!    case-insensitive) in any of its text fields or tag keys/values.
//! 3. Documents scoring zero are dropped.
//! 4. Results are sorted by score (desc), then document id (asc).
//! 5. Truncated to `limit`.
//!
//! Ranking is deliberately simple; remote indexes apply their own.

use crate::models::IndexFields;

/// Splits a query into lower-cased terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Counts how many of `terms` appear in the document's fields or tags.
pub fn match_score(terms: &[String], doc: &IndexFields) -> usize {
    let haystack: Vec<String> = doc
        .fields
        .values()
        .chain(doc.tags.keys())
        .chain(doc.tags.values())
        .map(|v| v.to_lowercase())
        .collect();

    terms
        .iter()
        .filter(|t| haystack.iter().any(|h| h.contains(t.as_str())))
        .count()
}

/// Ranks `(document_id, fields)` candidates against `query`.
pub fn rank<'a, I>(query: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a IndexFields)>,
{
    let terms = query_terms(query);
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|(id, fields)| {
            let score = match_score(&terms, fields);
            if score > 0 {
                Some((score, id))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.truncate(limit);
    scored.into_iter().map(|(_, id)| id.to_string()).collect()
}
