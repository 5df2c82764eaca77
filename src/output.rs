use crate::models::{FinalResults, SampleReport, Statistics};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print evaluation results in the specified format
pub fn print_results(results: &FinalResults, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(results)),
        OutputFormat::Json => match render_json(results) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing results to JSON: {}", e),
        },
    }
}

/// Render results as pretty JSON
pub fn render_json(results: &FinalResults) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

/// Render results as a plain-text report
pub fn render_plain(results: &FinalResults) -> String {
    PlainReport(results).to_string()
}

/// Plain-text view of a run's results
struct PlainReport<'a>(&'a FinalResults);

impl fmt::Display for PlainReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = self.0;

        writeln!(f, "📊 STATISTICS ({} samples)", results.statistics.count)?;
        writeln!(f, "-------------")?;
        write_statistics(f, &results.statistics)?;
        writeln!(f)?;

        write_breakdown(f, "BY DIFFICULTY", &results.by_difficulty)?;
        write_breakdown(f, "BY CATEGORY", &results.by_category)?;

        writeln!(f, "📝 DETAILED RESULTS")?;
        writeln!(f, "-------------------")?;
        for (i, report) in results.results.iter().enumerate() {
            write_report(f, i + 1, report)?;
        }

        if !results.skipped.is_empty() {
            writeln!(f, "⚠️  SKIPPED (no prediction)")?;
            for question in &results.skipped {
                writeln!(f, "  • {}", question)?;
            }
        }
        Ok(())
    }
}

/// Print overall score and nDCG@5 per group
fn write_breakdown(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    groups: &BTreeMap<String, Statistics>,
) -> fmt::Result {
    if groups.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", "-".repeat(title.len()))?;
    writeln!(f, "{:<15} {:<8} {:<10} {:<10}", "Group", "Count", "Overall", "nDCG@5")?;
    for (group, stats) in groups {
        let overall = stats.mean.get("overall_score").unwrap_or(&0.0);
        let ndcg = stats.mean.get("ndcg_at_5").unwrap_or(&0.0);
        writeln!(
            f,
            "{:<15} {:<8} {:<10.2} {:<10.3}",
            group, stats.count, overall, ndcg
        )?;
    }
    writeln!(f)
}

/// Print one sample's scores
fn write_report(f: &mut fmt::Formatter<'_>, number: usize, report: &SampleReport) -> fmt::Result {
    let evaluation = &report.evaluation;
    writeln!(f, "Result #{} [{} / {}]", number, report.difficulty, report.category)?;
    writeln!(f, "Question: {}", evaluation.question)?;
    writeln!(f, "Answer: {}", evaluation.answer)?;
    writeln!(f, "Overall score: {:.2}", evaluation.overall_score())?;
    writeln!(
        f,
        "  • retrieval: nDCG@5 {:.3}, P@5 {:.3}, R@5 {:.3}, MRR {:.3}",
        evaluation.retrieval_metrics.ndcg_at_5,
        evaluation.retrieval_metrics.precision_at_5,
        evaluation.retrieval_metrics.recall_at_5,
        evaluation.retrieval_metrics.mean_reciprocal_rank
    )?;
    writeln!(
        f,
        "  • citations: accuracy {:.3}, recall {:.3}, hallucination {:.3}{}",
        evaluation.citation_metrics.citation_accuracy,
        evaluation.citation_metrics.citation_recall,
        evaluation.citation_metrics.hallucination_rate,
        if report.meets_citation_threshold { "" } else { " (below threshold)" }
    )?;
    writeln!(
        f,
        "  • answer: relevance {:.3}, completeness {:.3}, coherence {:.3}",
        evaluation.answer_metrics.relevance_score,
        evaluation.answer_metrics.completeness,
        evaluation.answer_metrics.coherence
    )?;
    writeln!(
        f,
        "  • latency: {:.0} ms, cost ${:.4}",
        evaluation.performance_metrics.total_latency_ms,
        evaluation.performance_metrics.total_cost_usd
    )?;
    if !report.unavailable.is_empty() {
        writeln!(f, "  • unavailable: {}", report.unavailable.join(", "))?;
    }
    writeln!(f)
}

/// Print statistics in plain text format
fn write_statistics(f: &mut fmt::Formatter<'_>, stats: &Statistics) -> fmt::Result {
    if stats.mean.is_empty() {
        return writeln!(f, "No statistics available.");
    }

    writeln!(
        f,
        "{:<22} {:<10} {:<10} {:<10}",
        "Metric", "Mean", "Median", "Mode"
    )?;
    writeln!(f, "{}", "-".repeat(55))?;

    for (metric, mean) in &stats.mean {
        let median = stats.median.get(metric).unwrap_or(&0.0);
        let mode = stats.mode.get(metric).unwrap_or(&0.0);
        writeln!(
            f,
            "{:<22} {:<10.3} {:<10.3} {:<10.3}",
            metric, mean, median, mode
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CitationMetrics, EvaluationResult};
    use crate::statistics::calculate_statistics;

    fn create_test_results() -> FinalResults {
        let evaluation = EvaluationResult {
            question: "What is the refund window?".to_string(),
            answer: "30 days [chunk_001]".to_string(),
            citation_metrics: CitationMetrics {
                citation_accuracy: 1.0,
                ..Default::default()
            },
            unavailable: vec!["judge".to_string()],
            ..Default::default()
        };
        let statistics = calculate_statistics(&[&evaluation]);
        let report = SampleReport {
            source_document: "policy.pdf".to_string(),
            difficulty: "easy".to_string(),
            category: "refunds".to_string(),
            unavailable: evaluation.unavailable.clone(),
            evaluation,
            meets_citation_threshold: true,
        };

        FinalResults {
            by_difficulty: BTreeMap::from([("easy".to_string(), statistics.clone())]),
            by_category: BTreeMap::from([("refunds".to_string(), statistics.clone())]),
            statistics,
            skipped: vec!["Who approves refunds?".to_string()],
            results: vec![report],
        }
    }

    #[test]
    fn test_json_output() {
        let json = render_json(&create_test_results()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["statistics"]["count"], 1);
        assert_eq!(value["results"][0]["category"], "refunds");
        assert_eq!(value["results"][0]["unavailable"][0], "judge");
        assert_eq!(value["results"][0]["evaluation"]["citation"]["citation_accuracy"], 1.0);
    }

    #[test]
    fn test_plain_output_sections() {
        let text = render_plain(&create_test_results());
        assert!(text.contains("STATISTICS (1 samples)"));
        assert!(text.contains("BY DIFFICULTY"));
        assert!(text.contains("BY CATEGORY"));
        assert!(text.contains("Question: What is the refund window?"));
        assert!(text.contains("unavailable: judge"));
        assert!(text.contains("Who approves refunds?"));
        assert!(text.contains("citation_accuracy"));
    }

    #[test]
    fn test_plain_output_empty_statistics() {
        let results = FinalResults {
            statistics: Statistics::default(),
            by_difficulty: BTreeMap::new(),
            by_category: BTreeMap::new(),
            skipped: vec![],
            results: vec![],
        };
        let text = render_plain(&results);
        assert!(text.contains("No statistics available."));
        assert!(!text.contains("BY DIFFICULTY"));
        assert!(!text.contains("SKIPPED"));
    }

    #[test]
    fn test_plain_output_section_order() {
        let text = render_plain(&create_test_results());
        let position = |needle: &str| text.find(needle).unwrap();
        assert!(position("STATISTICS") < position("BY DIFFICULTY"));
        assert!(position("BY DIFFICULTY") < position("BY CATEGORY"));
        assert!(position("BY CATEGORY") < position("DETAILED RESULTS"));
        assert!(position("DETAILED RESULTS") < position("SKIPPED"));
        assert!(text.ends_with("Who approves refunds?\n"));
    }

    #[test]
    fn test_below_threshold_is_flagged() {
        let mut results = create_test_results();
        results.results[0].meets_citation_threshold = false;
        assert!(render_plain(&results).contains("(below threshold)"));
    }

    #[test]
    fn test_output_format_variants() {
        assert!(matches!(
            OutputFormat::from_str("plain", true),
            Ok(OutputFormat::Plain)
        ));
        assert!(matches!(
            OutputFormat::from_str("json", true),
            Ok(OutputFormat::Json)
        ));
    }
}
