use crate::config::Config;
use crate::dataset::{GroundTruthDataset, GroundTruthSample};
use crate::evaluation::{EvaluationInput, Evaluator};
use crate::models::{EvaluationResult, FinalResults, Prediction, PredictionSet, SampleReport, Statistics};
use crate::statistics::calculate_statistics;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Main runner that orchestrates a batch evaluation
pub struct Runner {
    config: Config,
    evaluator: Evaluator,
}

impl Runner {
    /// Create a runner, building the configured external scorers once
    pub fn new(config: Config) -> Self {
        let evaluator = Evaluator::from_config(&config);
        Self::with_evaluator(config, evaluator)
    }

    /// Create a runner around an already-built evaluator
    pub fn with_evaluator(config: Config, evaluator: Evaluator) -> Self {
        Self { config, evaluator }
    }

    /// Load the dataset and predictions, evaluate every sample and store
    /// the results if a storage path is configured
    pub async fn run(&self) -> Result<FinalResults> {
        let dataset = GroundTruthDataset::from_json(&self.config.dataset_path).with_context(|| {
            format!(
                "Failed to load ground-truth dataset: {}",
                self.config.dataset_path.display()
            )
        })?;
        let predictions = load_predictions(&self.config.predictions_path)?;
        info!(
            samples = dataset.len(),
            predictions = predictions.len(),
            "starting evaluation run"
        );

        let final_results = self.evaluate_dataset(&dataset, &predictions).await;
        self.store_results_if_configured(&final_results)?;

        Ok(final_results)
    }

    /// Evaluate every sample that has a prediction, preserving dataset order
    pub async fn evaluate_dataset(
        &self,
        dataset: &GroundTruthDataset,
        predictions: &[Prediction],
    ) -> FinalResults {
        let (pairs, skipped) = pair_with_predictions(dataset, predictions);
        let total_samples = pairs.len();

        let results: Vec<SampleReport> = stream::iter(pairs.into_iter().enumerate())
            .map(|(index, (sample, prediction))| {
                self.evaluate_sample(sample, prediction, index + 1, total_samples)
            })
            .buffered(self.config.evaluator.max_concurrency.max(1))
            .collect()
            .await;

        info!(
            evaluated = results.len(),
            skipped = skipped.len(),
            "calculating statistics"
        );

        let evaluations: Vec<&EvaluationResult> = results.iter().map(|r| &r.evaluation).collect();
        FinalResults {
            statistics: calculate_statistics(&evaluations),
            by_difficulty: breakdown(&results, |r| r.difficulty.as_str()),
            by_category: breakdown(&results, |r| r.category.as_str()),
            skipped,
            results,
        }
    }

    async fn evaluate_sample(
        &self,
        sample: &GroundTruthSample,
        prediction: &Prediction,
        sample_num: usize,
        total_samples: usize,
    ) -> SampleReport {
        info!("Processing sample {}/{}", sample_num, total_samples);

        let input = EvaluationInput::from_prediction(sample, prediction);
        let evaluation = self.evaluator.evaluate(&input).await;

        let meets_citation_threshold = sample.expected_chunks.is_empty()
            || evaluation.citation_metrics.citation_accuracy >= sample.min_citation_accuracy;

        SampleReport {
            source_document: sample.source_document.clone(),
            difficulty: sample.difficulty.to_string(),
            category: sample.category.clone(),
            unavailable: evaluation.unavailable.clone(),
            evaluation,
            meets_citation_threshold,
        }
    }

    /// Store results if storage path is configured
    fn store_results_if_configured(&self, final_results: &FinalResults) -> Result<()> {
        if let Some(storage_path) = &self.config.storage_path {
            info!("Storing results to {}", storage_path.display());
            self.store_results(final_results, storage_path)?;
        }
        Ok(())
    }

    /// Store results to a JSON file
    fn store_results(&self, final_results: &FinalResults, path: &Path) -> Result<()> {
        let json_content = serialize_results(final_results)?;
        ensure_directory_exists(path)?;
        std::fs::write(path, json_content)
            .with_context(|| format!("Failed to write results to: {}", path.display()))?;
        info!("Results stored to: {}", path.display());

        Ok(())
    }
}

/// Load pipeline predictions from a `{"predictions": [...]}` JSON file
pub fn load_predictions(path: &Path) -> Result<Vec<Prediction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read predictions: {}", path.display()))?;
    let set: PredictionSet = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse predictions: {}", path.display()))?;
    Ok(set.predictions)
}

/// Join samples to predictions by exact question text. Returns the matched
/// pairs in dataset order and the questions without a prediction.
fn pair_with_predictions<'a>(
    dataset: &'a GroundTruthDataset,
    predictions: &'a [Prediction],
) -> (Vec<(&'a GroundTruthSample, &'a Prediction)>, Vec<String>) {
    let mut by_question: HashMap<&str, &Prediction> = HashMap::with_capacity(predictions.len());
    for prediction in predictions {
        if by_question.contains_key(prediction.question.as_str()) {
            warn!(question = %prediction.question, "duplicate prediction ignored");
            continue;
        }
        by_question.insert(prediction.question.as_str(), prediction);
    }

    let mut pairs = Vec::with_capacity(dataset.len());
    let mut skipped = Vec::new();
    for sample in dataset {
        match by_question.get(sample.question.as_str()) {
            Some(prediction) => pairs.push((sample, *prediction)),
            None => {
                warn!(question = %sample.question, "no prediction for sample, skipping");
                skipped.push(sample.question.clone());
            }
        }
    }
    (pairs, skipped)
}

/// Statistics per group of reports
fn breakdown(
    reports: &[SampleReport],
    key: impl Fn(&SampleReport) -> &str,
) -> BTreeMap<String, Statistics> {
    let mut groups: BTreeMap<String, Vec<&EvaluationResult>> = BTreeMap::new();
    for report in reports {
        groups
            .entry(key(report).to_string())
            .or_default()
            .push(&report.evaluation);
    }
    groups
        .into_iter()
        .map(|(group, evaluations)| (group, calculate_statistics(&evaluations)))
        .collect()
}

fn serialize_results(final_results: &FinalResults) -> Result<String> {
    serde_json::to_string_pretty(final_results).context("Failed to serialize results to JSON")
}

/// Ensure the directory for the results file exists
fn ensure_directory_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
