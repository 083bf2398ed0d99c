//! Book name to catalog item resolution.
//!
//! First hit wins:
//! 1. exact title match
//! 2. substring match in either direction (case-insensitive)
//! 3. best token overlap `|A ∩ B| / max(|A|, |B|)` above [`MATCH_THRESHOLD`]

use std::collections::HashSet;

use tracing::debug;

use super::{CatalogStore, CatalogTitle};
use crate::database::StoreError;

/// Minimum token overlap score for a fuzzy match (exclusive).
pub const MATCH_THRESHOLD: f64 = 0.3;

/// Lowercase, drop punctuation, treat separators as spaces, split on whitespace.
pub fn normalize_tokens(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || matches!(c, '_' | '-' | '.' | '/' | '\\' | '|' | '+') {
                Some(' ')
            } else {
                None
            }
        })
        .collect();

    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Token overlap score in `[0, 1]`.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let a = normalize_tokens(a);
    let b = normalize_tokens(b);
    let denominator = a.len().max(b.len());
    if denominator == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / denominator as f64
}

/// Pick the catalog item matching `book_name`, if any.
pub fn match_title(book_name: &str, candidates: &[CatalogTitle]) -> Option<i64> {
    if book_name.trim().is_empty() {
        return None;
    }

    if let Some(hit) = candidates.iter().find(|c| c.title == book_name) {
        debug!("Exact catalog match for '{}': {}", book_name, hit.id);
        return Some(hit.id);
    }

    let needle = book_name.to_lowercase();
    if let Some(hit) = candidates.iter().find(|c| {
        let title = c.title.to_lowercase();
        !title.trim().is_empty() && (title.contains(&needle) || needle.contains(&title))
    }) {
        debug!("Substring catalog match for '{}': {}", book_name, hit.id);
        return Some(hit.id);
    }

    let mut best: Option<(i64, f64)> = None;
    for candidate in candidates {
        let score = token_overlap(book_name, &candidate.title);
        if score > MATCH_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.id, score));
        }
    }

    if let Some((id, score)) = best {
        debug!(
            "Token overlap catalog match for '{}': {} (score {:.2})",
            book_name, id, score
        );
    }
    best.map(|(id, _)| id)
}

/// Resolve `book_name` against every title in the catalog.
pub fn resolve_identity(
    catalog: &dyn CatalogStore,
    book_name: &str,
) -> Result<Option<i64>, StoreError> {
    let titles = catalog.titles()?;
    Ok(match_title(book_name, &titles))
}
