//! Chat-model client used by the judge and the RAG-assessment scorer.

use crate::config::ModelConfig;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Errors from chat-model calls
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("environment variable {0} not found")]
    MissingApiKey(String),

    #[error("API error: {0}")]
    Api(#[from] OpenAIError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned no content")]
    EmptyResponse,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unparseable model output: {0}")]
    Parse(String),
}

/// A single system + user exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Token usage reported for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Text returned by the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// A language model capable of one request/response chat completion
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    fn model_name(&self) -> &str;
}

/// Enforce a minimum interval between requests
async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
    if rate_limit_rps <= 0.0 {
        return;
    }

    let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

    if let Some(last_time) = *last_request {
        let elapsed = last_time.elapsed();
        if elapsed < min_interval {
            sleep(min_interval - elapsed).await;
        }
    }

    *last_request = Some(Instant::now());
}

/// Client for any OpenAI-compatible chat completion endpoint
pub struct OpenAiChatClient {
    client: Client<OpenAIConfig>,
    config: ModelConfig,
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiChatClient {
    /// Create a client with an explicit API key
    pub fn new(
        api_key: impl Into<String>,
        config: ModelConfig,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_endpoint);
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Create a client reading the API key from the configured environment variable
    pub fn from_config(config: &ModelConfig, request_timeout: Duration) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.env_var_api_key)
            .map_err(|_| LlmError::MissingApiKey(config.env_var_api_key.clone()))?;
        Self::new(api_key, config.clone(), request_timeout)
    }

    /// Build the chat completion request
    fn build_request(&self, request: ChatRequest) -> Result<CreateChatCompletionRequest, LlmError> {
        let system_message: ChatCompletionRequestMessage =
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()?
                .into();

        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user)
                .build()?
                .into();

        let max_tokens = u16::try_from(self.config.max_tokens).unwrap_or(u16::MAX);

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages([system_message, user_message])
            .temperature(self.config.temperature as f32)
            .top_p(self.config.top_p as f32)
            .max_tokens(max_tokens)
            .build()?)
    }

    /// Extract content and usage from the API response
    fn extract_response(response: CreateChatCompletionResponse) -> Result<ChatResponse, LlmError> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        let usage = response
            .usage
            .map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse { content, usage })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        {
            let mut last_request = self.last_request.lock().await;
            enforce_rate_limit(&mut last_request, self.config.rate_limit_rps).await;
        }

        let request = self.build_request(request)?;
        let response = self.client.chat().create(request).await?;
        Self::extract_response(response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Recover a JSON object from model output.
///
/// Tolerates a fenced code block around the payload and prose before or
/// after the outermost braces.
pub fn parse_json_payload(response: &str) -> Result<Value, LlmError> {
    let unfenced = strip_code_fence(response);
    match serde_json::from_str(unfenced) {
        Ok(parsed) => Ok(parsed),
        Err(_) => extract_embedded_json(unfenced),
    }
}

/// Remove one leading and one trailing ``` delimiter, if present
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Try to extract JSON that might be embedded in text
fn extract_embedded_json(response: &str) -> Result<Value, LlmError> {
    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&response[start..=end])
            .map_err(|e| LlmError::Parse(format!("failed to parse extracted JSON: {e}"))),
        (Some(_), _) => Err(LlmError::Parse(
            "found opening brace but no closing brace in response".to_string(),
        )),
        (None, _) => Err(LlmError::Parse("no JSON found in response".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant as TokioInstant;

    fn test_model_config(endpoint: &str) -> ModelConfig {
        ModelConfig::new(endpoint, "RAG_EVAL_TEST_KEY_THAT_IS_NEVER_SET", "gpt-4o-mini")
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_no_limit() {
        let mut last_request = None;
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 0.0).await;

        assert!(start.elapsed() < Duration::from_millis(10));
        assert!(last_request.is_none());
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_first_request() {
        let mut last_request = None;
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 10.0).await;

        assert!(start.elapsed() < Duration::from_millis(10));
        assert!(last_request.is_some());
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_with_sleep() {
        let mut last_request = Some(Instant::now());
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 100.0).await;

        assert!(start.elapsed() >= Duration::from_millis(8));
    }

    #[test]
    fn test_from_config_missing_env_var() {
        let config = test_model_config("https://api.openai.com/v1");
        let result = OpenAiChatClient::from_config(&config, Duration::from_secs(5));
        assert!(matches!(result, Err(LlmError::MissingApiKey(_))));
    }

    #[test]
    fn test_parse_plain_json() {
        let value = parse_json_payload(r#"{"relevance": 8}"#).unwrap();
        assert_eq!(value, json!({"relevance": 8}));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"relevance\": 7, \"reasoning\": \"ok\"}\n```";
        let value = parse_json_payload(raw).unwrap();
        assert_eq!(value["relevance"], 7);
    }

    #[test]
    fn test_parse_fence_without_info_string() {
        let raw = "```\n{\"score\": 0.5}\n```\n";
        assert_eq!(parse_json_payload(raw).unwrap()["score"], 0.5);
    }

    #[test]
    fn test_parse_embedded_json() {
        let raw = r#"Here is the evaluation: {"score": 0.7} That's all."#;
        assert_eq!(parse_json_payload(raw).unwrap()["score"], 0.7);
    }

    #[test]
    fn test_parse_no_closing_brace() {
        assert!(parse_json_payload(r#"{"score": 0.8"#).is_err());
    }

    #[test]
    fn test_parse_no_json() {
        assert!(matches!(
            parse_json_payload("invalid json content"),
            Err(LlmError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_against_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"score\": 0.9}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        });
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = OpenAiChatClient::new(
            "test-key",
            test_model_config(&server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        let response = client
            .complete(ChatRequest::new("system", "user"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "{\"score\": 0.9}");
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 5);
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }
}
