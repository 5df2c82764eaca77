//! Evaluation core for retrieval-augmented generation pipelines.
//!
//! Scores retrieval ranking, citation correctness and answer quality for
//! each question, and combines them into a single 0 to 100 score.

pub mod citation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod judge;
pub mod llm;
pub mod models;
pub mod output;
pub mod ragas;
pub mod retrieval;
pub mod runner;
pub mod statistics;

pub use config::Config;
pub use dataset::{Difficulty, GroundTruthDataset, GroundTruthSample};
pub use error::{EvalError, Result};
pub use evaluation::{EvaluationInput, Evaluator};
pub use judge::{JudgeScores, LlmJudge};
pub use models::EvaluationResult;
pub use ragas::{RagasScorer, RagasScores};
