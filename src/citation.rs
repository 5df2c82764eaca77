//! Citation scoring and extraction.
//!
//! Citations are recovered lexically: the answer prompt asks the model to
//! cite chunks as `[chunk_001]`, and anything matching `chunk_` followed by
//! three or more digits counts. Any other citation format extracts nothing,
//! which leaves the citation metrics at their "no citations" values.

use crate::models::CitationMetrics;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static CITATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)chunk_\d{3,}").expect("citation pattern is a valid regex")
});

/// Extract cited chunk IDs from generated text.
///
/// IDs keep the text as written. Repeats that differ only in case are
/// dropped, keeping the first appearance.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CITATION_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|id| seen.insert(id.to_ascii_lowercase()))
        .collect()
}

/// Distinct IDs, compared case-insensitively like the citation pattern
fn distinct(ids: &[String]) -> HashSet<String> {
    ids.iter().map(|id| id.to_ascii_lowercase()).collect()
}

fn overlap(cited: &HashSet<String>, expected: &HashSet<String>) -> usize {
    cited.intersection(expected).count()
}

/// Share of cited IDs that are expected.
///
/// An empty citation list is correct only when nothing was expected.
pub fn citation_accuracy(cited: &[String], expected: &[String]) -> f64 {
    let cited = distinct(cited);
    let expected = distinct(expected);
    if cited.is_empty() {
        return if expected.is_empty() { 1.0 } else { 0.0 };
    }
    overlap(&cited, &expected) as f64 / cited.len() as f64
}

/// Same formula as [`citation_accuracy`].
pub fn citation_precision(cited: &[String], expected: &[String]) -> f64 {
    citation_accuracy(cited, expected)
}

/// Share of expected IDs that were cited.
pub fn citation_recall(cited: &[String], expected: &[String]) -> f64 {
    let cited = distinct(cited);
    let expected = distinct(expected);
    if expected.is_empty() {
        return if cited.is_empty() { 1.0 } else { 0.0 };
    }
    overlap(&cited, &expected) as f64 / expected.len() as f64
}

/// Share of cited IDs that are not expected; 0.0 when nothing is cited.
pub fn hallucination_rate(cited: &[String], expected: &[String]) -> f64 {
    let cited = distinct(cited);
    if cited.is_empty() {
        return 0.0;
    }
    let expected = distinct(expected);
    cited.difference(&expected).count() as f64 / cited.len() as f64
}

impl CitationMetrics {
    /// Score one answer's citations; all zero when there is no ground truth
    pub fn compute(cited: &[String], expected: &[String]) -> Self {
        if expected.is_empty() {
            return Self::default();
        }
        Self {
            citation_accuracy: citation_accuracy(cited, expected),
            citation_precision: citation_precision(cited, expected),
            citation_recall: citation_recall(cited, expected),
            hallucination_rate: hallucination_rate(cited, expected),
        }
    }
}
