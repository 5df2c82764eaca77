use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection and sampling settings for an OpenAI-compatible chat model
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelConfig {
    /// OpenAI-compatible API base URL
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Model name sent with every request
    pub model: String,
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Nucleus sampling mass (0.0 to 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Maximum tokens in a completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rate limit for API requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
}

fn default_temperature() -> f64 {
    0.0
}

fn default_top_p() -> f64 {
    1.0
}

fn default_max_tokens() -> u32 {
    512
}

fn default_rate_limit() -> f64 {
    10.0
}

impl ModelConfig {
    /// Model configuration with default sampling settings
    pub fn new(
        api_endpoint: impl Into<String>,
        env_var_api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            env_var_api_key: env_var_api_key.into(),
            model: model.into(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            rate_limit_rps: default_rate_limit(),
        }
    }

    /// Override the sampling temperature, rejecting values outside [0, 2]
    pub fn with_temperature(mut self, temperature: f64) -> Result<Self> {
        self.temperature = temperature;
        self.validate()?;
        Ok(self)
    }

    /// Override nucleus sampling mass, rejecting values outside [0, 1]
    pub fn with_top_p(mut self, top_p: f64) -> Result<Self> {
        self.top_p = top_p;
        self.validate()?;
        Ok(self)
    }

    /// Reject sampling settings the API would refuse
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EvalError::InvalidConfig(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(EvalError::InvalidConfig(format!(
                "top_p must be within [0, 1], got {}",
                self.top_p
            )));
        }
        if self.model.trim().is_empty() {
            return Err(EvalError::InvalidConfig("model must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Evaluator switches and external-call limits
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EvaluatorConfig {
    /// Score answers with the RAG-assessment metrics
    #[serde(default)]
    pub use_ragas: bool,
    /// Score answers with the LLM judge
    #[serde(default = "default_true")]
    pub use_llm_judge: bool,
    /// Maximum samples evaluated at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout applied to each external call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            use_ragas: false,
            use_llm_judge: true,
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl EvaluatorConfig {
    /// Timeout applied to each external call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(EvalError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(EvalError::InvalidConfig(
                "call_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root configuration for one batch evaluation run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Ground-truth dataset (JSON)
    pub dataset_path: PathBuf,
    /// Pipeline outputs to score (JSON)
    pub predictions_path: PathBuf,
    /// Optional local path to store results as JSON
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Model used by the LLM judge
    #[serde(default)]
    pub judge: Option<ModelConfig>,
    /// Model used for RAG-assessment scoring; falls back to `judge`
    #[serde(default)]
    pub ragas: Option<ModelConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.evaluator.validate()?;
        if let Some(judge) = &self.judge {
            judge.validate()?;
        }
        if let Some(ragas) = &self.ragas {
            ragas.validate()?;
        }
        Ok(())
    }

    /// Model settings for the Ragas scorer
    pub fn ragas_model(&self) -> Option<&ModelConfig> {
        self.ragas.as_ref().or(self.judge.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
dataset_path = "data/ground_truth.json"
predictions_path = "data/predictions.json"
storage_path = "/tmp/results.json"

[evaluator]
use_ragas = true
use_llm_judge = false
max_concurrency = 8
call_timeout_secs = 10

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o-mini"
temperature = 0.5
top_p = 0.9
max_tokens = 200
rate_limit_rps = 5.0
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.dataset_path, PathBuf::from("data/ground_truth.json"));
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/results.json")));
        assert!(config.evaluator.use_ragas);
        assert!(!config.evaluator.use_llm_judge);
        assert_eq!(config.evaluator.max_concurrency, 8);
        assert_eq!(config.evaluator.call_timeout(), Duration::from_secs(10));

        let judge = config.judge.as_ref().unwrap();
        assert_eq!(judge.model, "gpt-4o-mini");
        assert_eq!(judge.temperature, 0.5);
        assert_eq!(judge.top_p, 0.9);
        assert_eq!(judge.max_tokens, 200);
        assert_eq!(judge.rate_limit_rps, 5.0);
        assert_eq!(config.ragas_model(), Some(judge));
    }

    #[test]
    fn test_config_defaults() {
        let toml_content = r#"
dataset_path = "gt.json"
predictions_path = "pred.json"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o-mini"
"#;

        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.evaluator, EvaluatorConfig::default());
        assert!(config.storage_path.is_none());
        let judge = config.judge.unwrap();
        assert_eq!(judge.temperature, 0.0);
        assert_eq!(judge.top_p, 1.0);
        assert_eq!(judge.max_tokens, 512);
        assert_eq!(judge.rate_limit_rps, 10.0);
    }

    #[test]
    fn test_ragas_section_overrides_judge() {
        let toml_content = r#"
dataset_path = "gt.json"
predictions_path = "pred.json"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o"

[ragas]
api_endpoint = "http://localhost:8000/v1"
env_var_api_key = "LOCAL_KEY"
model = "llama3"
"#;

        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.ragas_model().unwrap().model, "llama3");
    }

    #[test]
    fn test_config_rejects_out_of_range_temperature() {
        let toml_content = r#"
dataset_path = "gt.json"
predictions_path = "pred.json"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o-mini"
temperature = 2.5
"#;

        let err = Config::from_toml(toml_content).unwrap_err();
        assert!(matches!(err, EvalError::InvalidConfig(_)));
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        let toml_content = r#"
dataset_path = "gt.json"
predictions_path = "pred.json"

[evaluator]
max_concurrency = 0
"#;

        assert!(matches!(
            Config::from_toml(toml_content),
            Err(EvalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_model_config_bounds() {
        let base = ModelConfig::new("http://localhost", "KEY", "m");
        assert!(base.clone().with_temperature(2.0).is_ok());
        assert!(base.clone().with_temperature(-0.1).is_err());
        assert!(base.clone().with_top_p(1.0).is_ok());
        assert!(base.clone().with_top_p(1.5).is_err());
        assert!(base.with_top_p(-0.5).is_err());
    }

    #[test]
    fn test_missing_config_file_is_not_found() {
        let err = Config::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, EvalError::NotFound(_)));
    }
}
