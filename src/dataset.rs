//! Labeled question/answer samples that drive a batch evaluation run.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// How hard a sample is to answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Lowercase name as stored in JSON
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_category() -> String {
    "general".to_string()
}

fn default_min_citation_accuracy() -> f64 {
    0.8
}

/// One labeled evaluation case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSample {
    pub question: String,
    #[serde(default)]
    pub expected_answer: String,
    /// Chunk IDs that should be retrieved; empty disables retrieval scoring
    #[serde(default)]
    pub expected_chunks: Vec<String>,
    #[serde(default)]
    pub source_document: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_min_citation_accuracy")]
    pub min_citation_accuracy: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Default for GroundTruthSample {
    fn default() -> Self {
        Self {
            question: String::new(),
            expected_answer: String::new(),
            expected_chunks: Vec::new(),
            source_document: String::new(),
            difficulty: Difficulty::default(),
            category: default_category(),
            min_citation_accuracy: default_min_citation_accuracy(),
            metadata: BTreeMap::new(),
        }
    }
}

impl GroundTruthSample {
    /// Sample with default difficulty, category and threshold
    pub fn new(
        question: impl Into<String>,
        expected_answer: impl Into<String>,
        expected_chunks: Vec<String>,
    ) -> Self {
        Self {
            question: question.into(),
            expected_answer: expected_answer.into(),
            expected_chunks,
            ..Default::default()
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_citation_accuracy) {
            return Err(EvalError::InvalidDataset(format!(
                "sample {index}: min_citation_accuracy must be within [0, 1], got {}",
                self.min_citation_accuracy
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct DatasetFile {
    #[serde(default)]
    samples: Vec<GroundTruthSample>,
}

#[derive(Serialize)]
struct DatasetMetadata {
    total_samples: usize,
    documents: usize,
}

#[derive(Serialize)]
struct DatasetFileRef<'a> {
    metadata: DatasetMetadata,
    samples: &'a [GroundTruthSample],
}

/// Ordered collection of samples, persisted as JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruthDataset {
    samples: Vec<GroundTruthSample>,
}

impl GroundTruthDataset {
    /// Dataset holding `samples` in the given order
    pub fn new(samples: Vec<GroundTruthSample>) -> Self {
        Self { samples }
    }

    /// Load a dataset from a `{"samples": [...]}` JSON file
    pub fn from_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let file: DatasetFile =
            serde_json::from_str(&content).map_err(|e| EvalError::json(path, e))?;
        for (index, sample) in file.samples.iter().enumerate() {
            sample.validate(index)?;
        }
        Ok(Self::new(file.samples))
    }

    /// Write the dataset as pretty JSON, creating parent directories
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }

        let file = DatasetFileRef {
            metadata: DatasetMetadata {
                total_samples: self.samples.len(),
                documents: self.document_count(),
            },
            samples: &self.samples,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| EvalError::json(path, e))?;
        std::fs::write(path, json).map_err(|e| EvalError::io(path, e))
    }

    /// Number of distinct source documents
    pub fn document_count(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.source_document.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Samples drawn from one source document
    pub fn get_by_document(&self, source_document: &str) -> Vec<GroundTruthSample> {
        self.filtered(|s| s.source_document == source_document)
    }

    /// Samples at one difficulty level
    pub fn get_by_difficulty(&self, difficulty: Difficulty) -> Vec<GroundTruthSample> {
        self.filtered(|s| s.difficulty == difficulty)
    }

    /// Samples in one category
    pub fn get_by_category(&self, category: &str) -> Vec<GroundTruthSample> {
        self.filtered(|s| s.category == category)
    }

    fn filtered(&self, keep: impl Fn(&GroundTruthSample) -> bool) -> Vec<GroundTruthSample> {
        self.samples.iter().filter(|s| keep(s)).cloned().collect()
    }

    /// Append a sample, keeping insertion order
    pub fn push(&mut self, sample: GroundTruthSample) {
        self.samples.push(sample);
    }

    /// All samples in insertion order
    pub fn samples(&self) -> &[GroundTruthSample] {
        &self.samples
    }

    /// Iterate samples in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, GroundTruthSample> {
        self.samples.iter()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<'a> IntoIterator for &'a GroundTruthDataset {
    type Item = &'a GroundTruthSample;
    type IntoIter = std::slice::Iter<'a, GroundTruthSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(question: &str, document: &str, difficulty: Difficulty, category: &str) -> GroundTruthSample {
        GroundTruthSample {
            question: question.to_string(),
            expected_answer: format!("answer to {question}"),
            expected_chunks: vec!["chunk_001".to_string(), "chunk_002".to_string()],
            source_document: document.to_string(),
            difficulty,
            category: category.to_string(),
            ..Default::default()
        }
    }

    fn dataset() -> GroundTruthDataset {
        GroundTruthDataset::new(vec![
            sample("q1", "policy.pdf", Difficulty::Easy, "refunds"),
            sample("q2", "policy.pdf", Difficulty::Hard, "shipping"),
            sample("q3", "faq.md", Difficulty::Easy, "refunds"),
        ])
    }

    fn round_trip(dataset: &GroundTruthDataset) -> GroundTruthDataset {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dataset.json");
        dataset.save_json(&path).unwrap();
        GroundTruthDataset::from_json(&path).unwrap()
    }

    #[test]
    fn test_round_trip_empty() {
        let empty = GroundTruthDataset::default();
        assert_eq!(round_trip(&empty), empty);
    }

    #[test]
    fn test_round_trip_single() {
        let mut single = GroundTruthDataset::default();
        let mut s = sample("q", "doc", Difficulty::Medium, "general");
        s.metadata.insert("page".to_string(), json!(4));
        s.min_citation_accuracy = 0.5;
        single.push(s);
        assert_eq!(round_trip(&single), single);
    }

    #[test]
    fn test_round_trip_many() {
        let many = dataset();
        assert_eq!(round_trip(&many), many);
    }

    #[test]
    fn test_save_writes_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        dataset().save_json(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["metadata"]["total_samples"], 3);
        assert_eq!(value["metadata"]["documents"], 2);
        assert_eq!(value["samples"][1]["difficulty"], "hard");
        assert!(content.contains("\n  \"metadata\""));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, r#"{"samples": [{"question": "What?"}]}"#).unwrap();

        let loaded = GroundTruthDataset::from_json(&path).unwrap();
        let s = &loaded.samples()[0];
        assert_eq!(s.difficulty, Difficulty::Medium);
        assert_eq!(s.category, "general");
        assert_eq!(s.min_citation_accuracy, 0.8);
        assert!(s.expected_chunks.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = GroundTruthDataset::from_json(Path::new("/nonexistent/gt.json")).unwrap_err();
        assert!(matches!(err, EvalError::NotFound(_)));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            GroundTruthDataset::from_json(&path),
            Err(EvalError::Json { .. })
        ));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"samples": [{"question": "q", "min_citation_accuracy": 1.5}]}"#,
        )
        .unwrap();
        assert!(matches!(
            GroundTruthDataset::from_json(&path),
            Err(EvalError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_filters_do_not_mutate() {
        let data = dataset();

        let policy = data.get_by_document("policy.pdf");
        assert_eq!(policy.len(), 2);
        assert_eq!(data.get_by_difficulty(Difficulty::Easy).len(), 2);
        assert_eq!(data.get_by_difficulty(Difficulty::Medium).len(), 0);
        let refunds = data.get_by_category("refunds");
        assert_eq!(
            refunds.iter().map(|s| s.question.as_str()).collect::<Vec<_>>(),
            vec!["q1", "q3"]
        );
        assert_eq!(data.len(), 3);
        assert_eq!(data, dataset());
    }

    #[test]
    fn test_iteration_preserves_order() {
        let data = dataset();
        let questions: Vec<&str> = (&data).into_iter().map(|s| s.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
        assert!(!data.is_empty());
    }
}
