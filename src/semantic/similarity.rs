//! Cosine similarity and brute-force ranking over the candidate pool.
//!
//! The catalog is small, so every query scores every embedded book:
//! O(N·D) per query.

use crate::books::{Book, SearchResult};

/// Cosine similarity between two vectors.
///
/// Accumulates in `f64` and narrows the final score to `f32`. Returns `0.0`
/// for vectors of different length, empty vectors, zero-norm vectors and
/// non-finite results.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return 0.0;
    }
    score as f32
}

/// Score every candidate against `query`, sort by descending similarity and
/// keep at most `limit` results (`0` keeps everything).
///
/// Candidates without an embedding and the `exclude` id are skipped. The sort
/// is stable, so equal scores keep the candidates' scan order.
pub fn rank(query: &[f32], candidates: Vec<Book>, exclude: Option<i64>, limit: usize) -> Vec<SearchResult> {
    let mut mismatched = 0usize;

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .filter(|book| Some(book.id) != exclude)
        .filter_map(|book| {
            let embedding = book.embedding.as_deref().filter(|e| !e.is_empty())?;
            if embedding.len() != query.len() {
                mismatched += 1;
            }
            let similarity = cosine_similarity(query, embedding);
            Some(SearchResult { book, similarity })
        })
        .collect();

    if mismatched > 0 {
        log::warn!(
            "{mismatched} embedded books have a dimensionality different from the query ({}); scored as 0",
            query.len()
        );
    }

    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    if limit > 0 {
        results.truncate(limit);
    }

    results
}

/// Map a signed limit from an outer layer onto [`rank`]'s convention.
pub fn limit_from_signed(limit: i64) -> usize {
    if limit <= 0 {
        0
    } else {
        limit as usize
    }
}
