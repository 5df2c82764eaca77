//! Ranked-retrieval quality metrics.
//!
//! Relevance is binary: a retrieved chunk is relevant iff its ID is in the
//! expected set. Every function returns a value in `[0, 1]` and never fails.

use crate::models::RetrievalMetrics;
use std::collections::HashSet;

/// Discount applied to the item at 1-based `rank`.
///
/// This is `1 / (rank + 1)`, not the textbook `1 / log2(rank + 1)`.
fn discount(rank: usize) -> f64 {
    1.0 / (rank as f64 + 1.0)
}

fn expected_set(expected: &[String]) -> HashSet<&str> {
    expected.iter().map(String::as_str).collect()
}

/// Count the distinct IDs in `retrieved[..k]` that are in `expected`.
fn hits_in_top_k(retrieved: &[String], expected: &HashSet<&str>, k: usize) -> usize {
    retrieved
        .iter()
        .take(k)
        .map(String::as_str)
        .filter(|id| expected.contains(id))
        .collect::<HashSet<_>>()
        .len()
}

/// Normalized discounted cumulative gain over the top `k` retrieved items.
pub fn ndcg_at_k(retrieved: &[String], expected: &[String], k: usize) -> f64 {
    let expected = expected_set(expected);
    if expected.is_empty() || k == 0 {
        return 0.0;
    }

    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| expected.contains(id.as_str()))
        .map(|(i, _)| discount(i + 1))
        .sum();

    let ideal_hits = expected.len().min(k);
    let idcg: f64 = (1..=ideal_hits).map(discount).sum();
    if idcg == 0.0 {
        return 0.0;
    }

    // Duplicate relevant IDs in the ranking could otherwise push this past 1.
    (dcg / idcg).min(1.0)
}

/// Share of the top `k` retrieved items that are relevant.
pub fn precision_at_k(retrieved: &[String], expected: &[String], k: usize) -> f64 {
    let considered = k.min(retrieved.len());
    if considered == 0 {
        return 0.0;
    }
    let expected = expected_set(expected);
    hits_in_top_k(retrieved, &expected, k) as f64 / considered as f64
}

/// Share of the expected items found in the top `k` retrieved items.
pub fn recall_at_k(retrieved: &[String], expected: &[String], k: usize) -> f64 {
    let expected = expected_set(expected);
    if expected.is_empty() {
        return 0.0;
    }
    hits_in_top_k(retrieved, &expected, k) as f64 / expected.len() as f64
}

/// Reciprocal of the 1-based rank of the first relevant retrieved item.
pub fn mean_reciprocal_rank(retrieved: &[String], expected: &[String]) -> f64 {
    let expected = expected_set(expected);
    retrieved
        .iter()
        .position(|id| expected.contains(id.as_str()))
        .map_or(0.0, |index| 1.0 / (index as f64 + 1.0))
}

impl RetrievalMetrics {
    /// Score one ranking against its ground truth at the fixed cutoffs 5 and 10.
    pub fn compute(retrieved: &[String], expected: &[String]) -> Self {
        if expected.is_empty() {
            return Self::default();
        }
        Self {
            ndcg_at_5: ndcg_at_k(retrieved, expected, 5),
            ndcg_at_10: ndcg_at_k(retrieved, expected, 10),
            precision_at_5: precision_at_k(retrieved, expected, 5),
            precision_at_10: precision_at_k(retrieved, expected, 10),
            recall_at_5: recall_at_k(retrieved, expected, 5),
            recall_at_10: recall_at_k(retrieved, expected, 10),
            mean_reciprocal_rank: mean_reciprocal_rank(retrieved, expected),
        }
    }
}
