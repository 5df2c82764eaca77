use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Latency below which a response earns the full latency score.
const LATENCY_BUDGET_MS: f64 = 3000.0;
/// Milliseconds over budget per latency score point lost.
const LATENCY_MS_PER_POINT: f64 = 10.0;

const RETRIEVAL_WEIGHT: f64 = 0.30;
const CITATION_WEIGHT: f64 = 0.30;
const ANSWER_WEIGHT: f64 = 0.20;
const LATENCY_WEIGHT: f64 = 0.20;

/// Ranking quality of the retrieved chunks for one query (each 0.0 to 1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub ndcg_at_5: f64,
    pub ndcg_at_10: f64,
    pub precision_at_5: f64,
    pub precision_at_10: f64,
    pub recall_at_5: f64,
    pub recall_at_10: f64,
    pub mean_reciprocal_rank: f64,
}

/// Quality of the citations made by one answer (each 0.0 to 1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationMetrics {
    pub citation_accuracy: f64,
    pub citation_precision: f64,
    pub citation_recall: f64,
    pub hallucination_rate: f64,
}

/// Quality of the generated answer (each 0.0 to 1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetrics {
    pub relevance_score: f64,
    pub completeness: f64,
    pub coherence: f64,
}

/// Latency, token and cost accounting for one answered question
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub retrieval_latency_ms: f64,
    pub llm_latency_ms: f64,
    /// Sum of retrieval and model latency
    pub total_latency_ms: f64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub total_cost_usd: f64,
}

impl PerformanceMetrics {
    /// Score in [0, 100]: full marks under the latency budget, then a
    /// linear penalty reaching zero at 13 seconds.
    pub fn latency_score(&self) -> f64 {
        if self.total_latency_ms < LATENCY_BUDGET_MS {
            100.0
        } else {
            (100.0 - (self.total_latency_ms - LATENCY_BUDGET_MS) / LATENCY_MS_PER_POINT).max(0.0)
        }
    }
}

/// Complete scored outcome for one evaluated question.
///
/// `overall_score` is derived on demand, so it always agrees with the
/// underlying metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub question: String,
    pub answer: String,
    pub retrieval_metrics: RetrievalMetrics,
    pub citation_metrics: CitationMetrics,
    pub answer_metrics: AnswerMetrics,
    pub performance_metrics: PerformanceMetrics,
    /// Sub-scores that were requested but fell back to their defaults
    pub unavailable: Vec<String>,
}

impl EvaluationResult {
    /// Weighted combination of retrieval, citation, answer and latency
    /// scores, in [0, 100], rounded to two decimals.
    pub fn overall_score(&self) -> f64 {
        let retrieval_score = self.retrieval_metrics.ndcg_at_5 * 100.0;
        let citation_score = self.citation_metrics.citation_accuracy * 100.0;
        let answer_score = self.answer_metrics.relevance_score * 100.0;
        let latency_score = self.performance_metrics.latency_score();

        let overall = RETRIEVAL_WEIGHT * retrieval_score
            + CITATION_WEIGHT * citation_score
            + ANSWER_WEIGHT * answer_score
            + LATENCY_WEIGHT * latency_score;

        (overall * 100.0).round() / 100.0
    }

    /// Flat metric-name to value map used for aggregate statistics
    pub fn score_map(&self) -> BTreeMap<String, f64> {
        let r = &self.retrieval_metrics;
        let c = &self.citation_metrics;
        let a = &self.answer_metrics;
        [
            ("ndcg_at_5", r.ndcg_at_5),
            ("ndcg_at_10", r.ndcg_at_10),
            ("precision_at_5", r.precision_at_5),
            ("precision_at_10", r.precision_at_10),
            ("recall_at_5", r.recall_at_5),
            ("recall_at_10", r.recall_at_10),
            ("mean_reciprocal_rank", r.mean_reciprocal_rank),
            ("citation_accuracy", c.citation_accuracy),
            ("citation_recall", c.citation_recall),
            ("hallucination_rate", c.hallucination_rate),
            ("relevance_score", a.relevance_score),
            ("completeness", a.completeness),
            ("coherence", a.coherence),
            ("total_latency_ms", self.performance_metrics.total_latency_ms),
            ("overall_score", self.overall_score()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    /// JSON form of the result, including the derived overall score
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
struct EvaluationRecord<'a> {
    question: &'a str,
    answer: &'a str,
    retrieval: &'a RetrievalMetrics,
    citation: &'a CitationMetrics,
    answer_metrics: &'a AnswerMetrics,
    performance: &'a PerformanceMetrics,
    overall_score: f64,
}

impl Serialize for EvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EvaluationRecord {
            question: &self.question,
            answer: &self.answer,
            retrieval: &self.retrieval_metrics,
            citation: &self.citation_metrics,
            answer_metrics: &self.answer_metrics,
            performance: &self.performance_metrics,
            overall_score: self.overall_score(),
        }
        .serialize(serializer)
    }
}

/// Output of the external retrieval/generation pipeline for one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prediction {
    pub question: String,
    pub answer: String,
    /// Retrieved chunk IDs, best first
    pub retrieved_chunks: Vec<String>,
    /// Concatenated text of the retrieved chunks
    pub context: String,
    pub retrieval_latency_ms: f64,
    pub llm_latency_ms: f64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub cost_usd: f64,
}

/// On-disk wrapper for a predictions file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSet {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// Report for one evaluated ground-truth sample
#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub source_document: String,
    pub difficulty: String,
    pub category: String,
    pub evaluation: EvaluationResult,
    /// Sub-scores that defaulted instead of being computed
    pub unavailable: Vec<String>,
    /// Whether citation accuracy reached the sample's minimum
    pub meets_citation_threshold: bool,
}

/// Statistics calculated across multiple results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of results aggregated
    pub count: usize,
    /// Mean per metric
    pub mean: BTreeMap<String, f64>,
    /// Median per metric
    pub median: BTreeMap<String, f64>,
    /// Mode per metric (most frequent value after rounding to 1 decimal)
    pub mode: BTreeMap<String, f64>,
}

/// Final results containing statistics and individual results
#[derive(Debug, Clone, Serialize)]
pub struct FinalResults {
    /// Aggregated statistics over every evaluated sample
    pub statistics: Statistics,
    /// Aggregates per difficulty level
    pub by_difficulty: BTreeMap<String, Statistics>,
    /// Aggregates per category
    pub by_category: BTreeMap<String, Statistics>,
    /// Samples skipped for lack of a prediction
    pub skipped: Vec<String>,
    /// Individual sample results
    pub results: Vec<SampleReport>,
}
