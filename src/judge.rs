//! LLM-as-judge scoring of generated answers.

use crate::llm::{ChatClient, ChatRequest, LlmError, parse_json_payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 10.0;

const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial evaluator of answers produced by a \
retrieval-augmented question answering system. Respond only with valid JSON.";

/// Self-reported quality scores, each on a 0 to 10 scale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub relevance: f64,
    pub completeness: f64,
    pub coherence: f64,
    /// 10 means no hallucinated content
    pub hallucination_score: f64,
    pub overall_score: f64,
    pub reasoning: String,
}

impl JudgeScores {
    /// Overall score scaled to [0, 1]
    pub fn normalized_overall(&self) -> f64 {
        self.overall_score / SCORE_MAX
    }

    fn from_value(parsed: &Value) -> Result<Self, LlmError> {
        if !parsed.is_object() {
            return Err(LlmError::Parse("judge response is not a JSON object".to_string()));
        }
        let score = |key: &str| {
            parsed
                .get(key)
                .and_then(Value::as_f64)
                .map_or(0.0, |value| value.clamp(SCORE_MIN, SCORE_MAX))
        };
        let reasoning = parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            relevance: score("relevance"),
            completeness: score("completeness"),
            coherence: score("coherence"),
            hallucination_score: score("hallucination_score"),
            overall_score: score("overall_score"),
            reasoning,
        })
    }
}

/// Prompts a chat model to grade an answer against a reference answer
pub struct LlmJudge {
    client: Arc<dyn ChatClient>,
    timeout: Duration,
}

impl LlmJudge {
    /// Judge that waits at most `timeout` for each model call
    pub fn new(client: Arc<dyn ChatClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Model used for grading
    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Score an answer, returning all-zero scores if the model call or
    /// response parsing fails
    pub async fn judge(
        &self,
        question: &str,
        answer: &str,
        expected_answer: &str,
        context: &str,
    ) -> JudgeScores {
        match self.try_judge(question, answer, expected_answer, context).await {
            Ok(scores) => scores,
            Err(LlmError::Parse(reason)) => {
                debug!(%reason, "judge response could not be parsed, using zero scores");
                JudgeScores::default()
            }
            Err(e) => {
                warn!(error = %e, model = self.model_name(), "judge call failed, using zero scores");
                JudgeScores::default()
            }
        }
    }

    /// Score an answer, surfacing failures to the caller
    pub async fn try_judge(
        &self,
        question: &str,
        answer: &str,
        expected_answer: &str,
        context: &str,
    ) -> Result<JudgeScores, LlmError> {
        let prompt = Self::build_prompt(question, answer, expected_answer, context);
        let request = ChatRequest::new(JUDGE_SYSTEM_PROMPT, prompt);

        let response = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        Self::parse_response(&response.content).inspect_err(|_| {
            debug!(raw_response = %response.content, "unparseable judge response");
        })
    }

    /// Build the grading rubric prompt
    fn build_prompt(question: &str, answer: &str, expected_answer: &str, context: &str) -> String {
        format!(
            r#"Grade the ANSWER to the QUESTION using the retrieved CONTEXT and the REFERENCE ANSWER.

QUESTION:
{question}

CONTEXT:
{context}

REFERENCE ANSWER:
{expected_answer}

ANSWER:
{answer}

Score each dimension from 0 to 10:
- relevance: how directly the answer addresses the question
- completeness: how much of the reference answer's content is covered
- coherence: how clear, well-structured and internally consistent the answer is
- hallucination_score: 10 if every claim is supported by the context, 0 if the answer is mostly unsupported
- overall_score: your overall judgement of answer quality

Respond with only this JSON object:
{{
  "relevance": <0-10>,
  "completeness": <0-10>,
  "coherence": <0-10>,
  "hallucination_score": <0-10>,
  "overall_score": <0-10>,
  "reasoning": "<brief explanation>"
}}"#
        )
    }

    /// Parse the judge's JSON, tolerating code fences and missing keys
    pub fn parse_response(response: &str) -> Result<JudgeScores, LlmError> {
        let parsed = parse_json_payload(response)?;
        JudgeScores::from_value(&parsed)
    }
}
