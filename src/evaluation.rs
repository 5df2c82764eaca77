use crate::citation::extract_citations;
use crate::config::{Config, ModelConfig};
use crate::dataset::GroundTruthSample;
use crate::judge::{JudgeScores, LlmJudge};
use crate::llm::{ChatClient, LlmError, OpenAiChatClient};
use crate::models::{
    AnswerMetrics, CitationMetrics, EvaluationResult, PerformanceMetrics, Prediction,
    RetrievalMetrics,
};
use crate::ragas::{RagasReport, RagasSample, RagasScorer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Everything known about one answered question
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationInput {
    pub question: String,
    pub answer: String,
    /// Retrieved chunk IDs, best first
    pub retrieved_chunks: Vec<String>,
    /// Concatenated text of the retrieved chunks
    pub context: String,
    pub expected_answer: Option<String>,
    /// `None` means there is no retrieval ground truth for this question
    pub expected_chunks: Option<Vec<String>>,
    pub retrieval_latency_ms: f64,
    pub llm_latency_ms: f64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub cost_usd: f64,
}

impl EvaluationInput {
    /// Pair a pipeline prediction with its ground-truth sample
    pub fn from_prediction(sample: &GroundTruthSample, prediction: &Prediction) -> Self {
        Self {
            question: sample.question.clone(),
            answer: prediction.answer.clone(),
            retrieved_chunks: prediction.retrieved_chunks.clone(),
            context: prediction.context.clone(),
            expected_answer: Some(sample.expected_answer.clone())
                .filter(|answer| !answer.trim().is_empty()),
            expected_chunks: Some(sample.expected_chunks.clone()),
            retrieval_latency_ms: prediction.retrieval_latency_ms,
            llm_latency_ms: prediction.llm_latency_ms,
            embedding_tokens: prediction.embedding_tokens,
            llm_input_tokens: prediction.llm_input_tokens,
            llm_output_tokens: prediction.llm_output_tokens,
            cost_usd: prediction.cost_usd,
        }
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            retrieval_latency_ms: self.retrieval_latency_ms,
            llm_latency_ms: self.llm_latency_ms,
            total_latency_ms: self.retrieval_latency_ms + self.llm_latency_ms,
            embedding_tokens: self.embedding_tokens,
            llm_input_tokens: self.llm_input_tokens,
            llm_output_tokens: self.llm_output_tokens,
            total_cost_usd: self.cost_usd,
        }
    }
}

/// Outcome of the judge step
enum JudgeOutcome {
    Skipped,
    Unconfigured,
    Scored(JudgeScores),
    Failed(LlmError),
}

/// Chat clients for the external scorers.
///
/// Without a `[ragas]` section both scorers hold the same client, so they
/// share its rate limit.
struct ScorerClients {
    judge: Option<Arc<dyn ChatClient>>,
    ragas: Option<Arc<dyn ChatClient>>,
}

impl ScorerClients {
    fn from_config(config: &Config) -> Self {
        let settings = &config.evaluator;
        let timeout = settings.call_timeout();
        let ragas_uses_judge = settings.use_ragas && config.ragas.is_none();

        let judge = match &config.judge {
            Some(model) if settings.use_llm_judge || ragas_uses_judge => {
                build_client(model, timeout, "judge")
            }
            _ => None,
        };

        let ragas = match &config.ragas {
            Some(model) if settings.use_ragas => build_client(model, timeout, "ragas"),
            _ if ragas_uses_judge => judge.clone(),
            _ => None,
        };

        Self { judge, ragas }
    }
}

fn build_client(
    model: &ModelConfig,
    timeout: Duration,
    role: &str,
) -> Option<Arc<dyn ChatClient>> {
    match OpenAiChatClient::from_config(model, timeout) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, role, "chat client unavailable, scorer disabled");
            None
        }
    }
}

/// Runs every sub-evaluator for one question and merges the results.
///
/// Holds only read-only handles, so one instance can serve many
/// concurrent `evaluate` calls.
pub struct Evaluator {
    use_ragas: bool,
    use_llm_judge: bool,
    ragas: RagasScorer,
    judge: Option<LlmJudge>,
}

impl Evaluator {
    /// Evaluator with already-resolved scorers
    pub fn new(
        use_ragas: bool,
        use_llm_judge: bool,
        ragas: RagasScorer,
        judge: Option<LlmJudge>,
    ) -> Self {
        Self {
            use_ragas,
            use_llm_judge,
            ragas,
            judge,
        }
    }

    /// Build the evaluator, constructing its external scorers once
    pub fn from_config(config: &Config) -> Self {
        let settings = &config.evaluator;
        let timeout = settings.call_timeout();
        let clients = ScorerClients::from_config(config);

        let judge = if settings.use_llm_judge {
            if config.judge.is_none() {
                warn!("LLM judge enabled but no [judge] model configured");
            }
            clients.judge.map(|client| LlmJudge::new(client, timeout))
        } else {
            None
        };

        let ragas = RagasScorer::from_client(settings.use_ragas, clients.ragas, timeout);

        Self::new(settings.use_ragas, settings.use_llm_judge, ragas, judge)
    }

    /// Score one question. Never fails: unavailable sub-scores stay at zero
    /// and are listed in `EvaluationResult::unavailable`.
    #[instrument(skip_all)]
    pub async fn evaluate(&self, input: &EvaluationInput) -> EvaluationResult {
        let started = Instant::now();
        let expected_chunks = input.expected_chunks.as_deref().unwrap_or_default();

        let retrieval_metrics = RetrievalMetrics::compute(&input.retrieved_chunks, expected_chunks);
        let cited = extract_citations(&input.answer);
        let citation_metrics = CitationMetrics::compute(&cited, expected_chunks);

        // Ragas and the judge are independent, so they run concurrently;
        // their results are applied in a fixed order below.
        let (ragas_report, judge_outcome) =
            tokio::join!(self.run_ragas(input), self.run_judge(input));

        let mut answer_metrics = AnswerMetrics::default();
        let mut unavailable = Vec::new();

        if let Some(report) = ragas_report {
            answer_metrics.relevance_score = report.scores.answer_relevance;
            answer_metrics.coherence = report.scores.faithfulness;
            unavailable.extend(
                report
                    .unavailable
                    .iter()
                    .map(|metric| format!("ragas.{metric}")),
            );
        }

        // The judge takes precedence over Ragas for the fields both set.
        match judge_outcome {
            JudgeOutcome::Skipped => {}
            JudgeOutcome::Unconfigured => unavailable.push("judge".to_string()),
            JudgeOutcome::Scored(scores) => {
                answer_metrics.relevance_score = scores.relevance / 10.0;
                answer_metrics.completeness = scores.completeness / 10.0;
                answer_metrics.coherence = scores.coherence / 10.0;
            }
            JudgeOutcome::Failed(LlmError::Parse(reason)) => {
                debug!(%reason, "judge response unparseable, keeping previous answer metrics");
                unavailable.push("judge".to_string());
            }
            JudgeOutcome::Failed(e) => {
                warn!(error = %e, "judge failed, keeping previous answer metrics");
                unavailable.push("judge".to_string());
            }
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            cited = cited.len(),
            "evaluated question"
        );

        EvaluationResult {
            question: input.question.clone(),
            answer: input.answer.clone(),
            retrieval_metrics,
            citation_metrics,
            answer_metrics,
            performance_metrics: input.performance_metrics(),
            unavailable,
        }
    }

    async fn run_ragas(&self, input: &EvaluationInput) -> Option<RagasReport> {
        if !self.use_ragas {
            return None;
        }
        let sample = RagasSample {
            question: input.question.clone(),
            answer: input.answer.clone(),
            contexts: vec![input.context.clone()],
            ground_truth: input.expected_answer.clone(),
        };
        Some(self.ragas.score(&sample).await)
    }

    async fn run_judge(&self, input: &EvaluationInput) -> JudgeOutcome {
        let Some(expected_answer) = input.expected_answer.as_deref() else {
            return JudgeOutcome::Skipped;
        };
        if !self.use_llm_judge {
            return JudgeOutcome::Skipped;
        }
        let Some(judge) = &self.judge else {
            return JudgeOutcome::Unconfigured;
        };
        match judge
            .try_judge(&input.question, &input.answer, expected_answer, &input.context)
            .await
        {
            Ok(scores) => JudgeOutcome::Scored(scores),
            Err(e) => JudgeOutcome::Failed(e),
        }
    }
}
