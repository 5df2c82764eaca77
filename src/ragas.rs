//! RAG-assessment scores: faithfulness, answer relevance, context recall
//! and context precision.
//!
//! Scoring goes through a [`RagasBackend`]. Whether a real backend is
//! available is decided once, when the [`RagasScorer`] is built; without one
//! the scorer is a no-op returning zeros. Each metric is scored
//! independently so one failing metric only zeroes itself.

use crate::llm::{ChatClient, ChatRequest, LlmError, parse_json_payload};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RAGAS_SYSTEM_PROMPT: &str =
    "You are an expert evaluator of retrieval-augmented generation. Respond only with valid JSON.";

/// One of the four assessment metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RagasMetric {
    Faithfulness,
    AnswerRelevance,
    ContextRecall,
    ContextPrecision,
}

impl RagasMetric {
    pub const ALL: [RagasMetric; 4] = [
        RagasMetric::Faithfulness,
        RagasMetric::AnswerRelevance,
        RagasMetric::ContextRecall,
        RagasMetric::ContextPrecision,
    ];

    /// Name used in reports and `unavailable` entries
    pub fn name(self) -> &'static str {
        match self {
            RagasMetric::Faithfulness => "faithfulness",
            RagasMetric::AnswerRelevance => "answer_relevance",
            RagasMetric::ContextRecall => "context_recall",
            RagasMetric::ContextPrecision => "context_precision",
        }
    }
}

impl fmt::Display for RagasMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs shared by every metric
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RagasSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    /// Reference answer, when the sample has one
    pub ground_truth: Option<String>,
}

/// Assessment scores, each in [0, 1]; zero means disabled or failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RagasScores {
    pub faithfulness: f64,
    pub answer_relevance: f64,
    pub context_recall: f64,
    pub context_precision: f64,
}

impl RagasScores {
    /// Unweighted mean of the four scores
    pub fn average(&self) -> f64 {
        (self.faithfulness + self.answer_relevance + self.context_recall + self.context_precision)
            / 4.0
    }

    /// Score for one metric
    pub fn get(&self, metric: RagasMetric) -> f64 {
        match metric {
            RagasMetric::Faithfulness => self.faithfulness,
            RagasMetric::AnswerRelevance => self.answer_relevance,
            RagasMetric::ContextRecall => self.context_recall,
            RagasMetric::ContextPrecision => self.context_precision,
        }
    }

    fn set(&mut self, metric: RagasMetric, value: f64) {
        let slot = match metric {
            RagasMetric::Faithfulness => &mut self.faithfulness,
            RagasMetric::AnswerRelevance => &mut self.answer_relevance,
            RagasMetric::ContextRecall => &mut self.context_recall,
            RagasMetric::ContextPrecision => &mut self.context_precision,
        };
        *slot = value;
    }
}

/// Scores plus the metrics that fell back to zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RagasReport {
    pub scores: RagasScores,
    pub unavailable: Vec<RagasMetric>,
}

/// Something that can compute a single assessment metric
#[async_trait]
pub trait RagasBackend: Send + Sync {
    async fn score(&self, metric: RagasMetric, sample: &RagasSample) -> Result<f64, LlmError>;
}

/// Backend that asks a chat model to grade each metric
pub struct LlmRagasBackend {
    client: Arc<dyn ChatClient>,
}

impl LlmRagasBackend {
    /// Backend grading every metric through `client`
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    fn prompt(metric: RagasMetric, sample: &RagasSample) -> String {
        let context = sample
            .contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[Context {}]: {}", i, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        let reference = sample.ground_truth.as_deref().unwrap_or("(not provided)");

        let task = match metric {
            RagasMetric::Faithfulness => format!(
                "Extract the factual claims made in the ANSWER and check each against the CONTEXT.\n\
                 Score the fraction of claims supported by the CONTEXT.\n\n\
                 CONTEXT:\n{context}\n\nANSWER:\n{answer}",
                answer = sample.answer
            ),
            RagasMetric::AnswerRelevance => format!(
                "Judge how directly and completely the ANSWER addresses the QUESTION, \
                 penalising unnecessary or off-topic content.\n\n\
                 QUESTION:\n{question}\n\nANSWER:\n{answer}",
                question = sample.question,
                answer = sample.answer
            ),
            RagasMetric::ContextRecall => format!(
                "Judge what fraction of the information in the REFERENCE ANSWER can be found in \
                 the retrieved CONTEXT. If no reference is provided, judge whether the CONTEXT \
                 contains everything needed to answer the QUESTION.\n\n\
                 QUESTION:\n{question}\n\nCONTEXT:\n{context}\n\nREFERENCE ANSWER:\n{reference}",
                question = sample.question
            ),
            RagasMetric::ContextPrecision => format!(
                "Judge what fraction of the retrieved CONTEXT is relevant to answering the \
                 QUESTION, weighting earlier context pieces more heavily.\n\n\
                 QUESTION:\n{question}\n\nCONTEXT:\n{context}",
                question = sample.question
            ),
        };

        format!(
            "{task}\n\nRespond in JSON:\n{{\n  \"score\": <float 0-1>,\n  \"reasoning\": \"<explanation>\"\n}}"
        )
    }
}

#[async_trait]
impl RagasBackend for LlmRagasBackend {
    async fn score(&self, metric: RagasMetric, sample: &RagasSample) -> Result<f64, LlmError> {
        let request = ChatRequest::new(RAGAS_SYSTEM_PROMPT, Self::prompt(metric, sample));
        let response = self.client.complete(request).await?;
        let parsed = parse_json_payload(&response.content)?;
        parsed
            .get("score")
            .and_then(Value::as_f64)
            .map(|score| score.clamp(0.0, 1.0))
            .ok_or_else(|| LlmError::Parse(format!("no numeric score for {metric}")))
    }
}

/// Either a real backend or the no-op fallback
#[derive(Clone)]
pub enum RagasScorer {
    Real {
        backend: Arc<dyn RagasBackend>,
        timeout: Duration,
    },
    Null,
}

impl fmt::Debug for RagasScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagasScorer::Real { timeout, .. } => {
                f.debug_struct("Real").field("timeout", timeout).finish()
            }
            RagasScorer::Null => f.write_str("Null"),
        }
    }
}

impl RagasScorer {
    /// Scorer backed by `backend`, with `timeout` applied to each metric
    pub fn real(backend: Arc<dyn RagasBackend>, timeout: Duration) -> Self {
        RagasScorer::Real { backend, timeout }
    }

    /// Resolve the scorer variant once, from the chat client it should use.
    ///
    /// Falls back to [`RagasScorer::Null`] when scoring is disabled or no
    /// client could be built.
    pub fn from_client(
        enabled: bool,
        client: Option<Arc<dyn ChatClient>>,
        timeout: Duration,
    ) -> Self {
        if !enabled {
            return RagasScorer::Null;
        }
        match client {
            Some(client) => {
                debug!(model = client.model_name(), "RAG-assessment scoring available");
                Self::real(Arc::new(LlmRagasBackend::new(client)), timeout)
            }
            None => {
                warn!("RAG-assessment scoring enabled but no model client, scores will be zero");
                RagasScorer::Null
            }
        }
    }

    /// Whether a real backend is wired in
    pub fn is_available(&self) -> bool {
        matches!(self, RagasScorer::Real { .. })
    }

    /// Score all four metrics concurrently; never fails
    pub async fn score(&self, sample: &RagasSample) -> RagasReport {
        let (backend, timeout) = match self {
            RagasScorer::Real { backend, timeout } => (backend, *timeout),
            RagasScorer::Null => {
                return RagasReport {
                    scores: RagasScores::default(),
                    unavailable: RagasMetric::ALL.to_vec(),
                };
            }
        };

        let outcomes = join_all(RagasMetric::ALL.map(|metric| async move {
            let outcome = tokio::time::timeout(timeout, backend.score(metric, sample))
                .await
                .unwrap_or(Err(LlmError::Timeout(timeout)));
            (metric, outcome)
        }))
        .await;

        let mut report = RagasReport::default();
        for (metric, outcome) in outcomes {
            match outcome {
                Ok(value) => report.scores.set(metric, value),
                Err(e) => {
                    warn!(%metric, error = %e, "RAG-assessment metric failed, defaulting to 0");
                    report.unavailable.push(metric);
                }
            }
        }
        report
    }
}
