use crate::models::{EvaluationResult, Statistics};
use std::collections::BTreeMap;

/// Calculate mean, median and mode of every scored metric across results
pub fn calculate_statistics(results: &[&EvaluationResult]) -> Statistics {
    let mut mean = BTreeMap::new();
    let mut median = BTreeMap::new();
    let mut mode = BTreeMap::new();

    let metrics = collect_metric_scores(results);

    for (metric, scores) in metrics {
        if scores.is_empty() {
            insert_zero_stats(&metric, &mut mean, &mut median, &mut mode);
            continue;
        }

        mean.insert(metric.clone(), calculate_mean(&scores));
        median.insert(metric.clone(), calculate_median(&scores));
        mode.insert(metric, calculate_mode(&scores));
    }

    Statistics {
        count: results.len(),
        mean,
        median,
        mode,
    }
}

/// Scores per metric name; every known metric is present, even with no results
fn collect_metric_scores(results: &[&EvaluationResult]) -> BTreeMap<String, Vec<f64>> {
    let mut metrics: BTreeMap<String, Vec<f64>> = EvaluationResult::default()
        .score_map()
        .into_keys()
        .map(|metric| (metric, Vec::with_capacity(results.len())))
        .collect();

    for result in results {
        for (metric, score) in result.score_map() {
            metrics.entry(metric).or_default().push(score);
        }
    }
    metrics
}

fn insert_zero_stats(
    metric: &str,
    mean: &mut BTreeMap<String, f64>,
    median: &mut BTreeMap<String, f64>,
    mode: &mut BTreeMap<String, f64>,
) {
    mean.insert(metric.to_string(), 0.0);
    median.insert(metric.to_string(), 0.0);
    mode.insert(metric.to_string(), 0.0);
}

fn calculate_mean(scores: &[f64]) -> f64 {
    let sum: f64 = scores.iter().sum();
    sum / scores.len() as f64
}

fn calculate_median(scores: &[f64]) -> f64 {
    let mut sorted_scores = scores.to_vec();
    sorted_scores.sort_by(f64::total_cmp);

    let mid = sorted_scores.len() / 2;
    if sorted_scores.len() % 2 == 0 {
        (sorted_scores[mid - 1] + sorted_scores[mid]) / 2.0
    } else {
        sorted_scores[mid]
    }
}

/// Most frequent value after rounding to 1 decimal place; ties go to the
/// smallest value
fn calculate_mode(scores: &[f64]) -> f64 {
    let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();

    for &score in scores {
        *frequency.entry((score * 10.0).round() as i64).or_insert(0) += 1;
    }

    frequency
        .into_iter()
        .max_by(|(a_key, a_count), (b_key, b_count)| {
            a_count.cmp(b_count).then_with(|| b_key.cmp(a_key))
        })
        .map_or(0.0, |(tenths, _)| tenths as f64 / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerMetrics, CitationMetrics, PerformanceMetrics, RetrievalMetrics};

    fn result(ndcg: f64, accuracy: f64, latency_ms: f64) -> EvaluationResult {
        EvaluationResult {
            retrieval_metrics: RetrievalMetrics {
                ndcg_at_5: ndcg,
                ..Default::default()
            },
            citation_metrics: CitationMetrics {
                citation_accuracy: accuracy,
                ..Default::default()
            },
            answer_metrics: AnswerMetrics::default(),
            performance_metrics: PerformanceMetrics {
                total_latency_ms: latency_ms,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_calculate_statistics_normal_case() {
        let results = [
            result(0.8, 1.0, 1000.0),
            result(0.6, 0.5, 2000.0),
            result(0.8, 0.0, 6000.0),
        ];
        let refs: Vec<&EvaluationResult> = results.iter().collect();

        let stats = calculate_statistics(&refs);

        assert_eq!(stats.count, 3);
        assert!((stats.mean["ndcg_at_5"] - 2.2 / 3.0).abs() < 1e-9);
        assert_eq!(stats.median["ndcg_at_5"], 0.8);
        assert_eq!(stats.mode["ndcg_at_5"], 0.8);
        assert_eq!(stats.mean["citation_accuracy"], 0.5);
        assert_eq!(stats.median["total_latency_ms"], 2000.0);
        assert!(stats.mean.contains_key("overall_score"));
    }

    #[test]
    fn test_calculate_statistics_empty_results() {
        let stats = calculate_statistics(&[]);

        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean.get("ndcg_at_5"), Some(&0.0));
        assert_eq!(stats.median.get("citation_accuracy"), Some(&0.0));
        assert_eq!(stats.mode.get("overall_score"), Some(&0.0));
    }

    #[test]
    fn test_calculate_statistics_even_number_results() {
        let results = [result(0.7, 0.0, 0.0), result(0.8, 0.0, 0.0)];
        let refs: Vec<&EvaluationResult> = results.iter().collect();

        let stats = calculate_statistics(&refs);

        assert!((stats.median["ndcg_at_5"] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_mode_rounds_to_one_decimal() {
        assert_eq!(calculate_mode(&[0.75]), 0.8);
        assert_eq!(calculate_mode(&[0.81, 0.79, 0.5]), 0.8);
        assert_eq!(calculate_mode(&[]), 0.0);
    }

    #[test]
    fn test_mode_tie_prefers_smallest() {
        assert_eq!(calculate_mode(&[0.9, 0.2, 0.9, 0.2]), 0.2);
    }

    #[test]
    fn test_median_single_value() {
        assert_eq!(calculate_median(&[0.42]), 0.42);
    }
}
