//! Ollama LLM client implementation.
//!
//! Implements the LlmClient trait for local Ollama instances, the default
//! provider. Requests use `/api/chat` with streaming disabled.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model for SQL generation.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder";

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Ollama client configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model to use (e.g., "qwen2.5-coder", "codellama").
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OllamaConfig {
    /// Creates a new config with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_MODEL)
    }
}

/// Ollama LLM client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

impl OllamaClient {
    /// Creates a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::generation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Checks if Ollama is available at the configured URL.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        self.client.get(&url).send().await.is_ok()
    }

    /// Converts internal messages to Ollama API format.
    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Returns the chat API endpoint URL.
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url)
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: StatusCode, body: &str) -> (ChatError, bool) {
        let is_retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;

        let message = serde_json::from_str::<OllamaErrorResponse>(body)
            .map(|r| r.error)
            .unwrap_or_else(|_| body.to_string());

        (
            ChatError::generation(format!("Ollama API error ({status}): {message}")),
            is_retryable,
        )
    }

    fn request_error(e: &reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::generation("Request timed out. Try again.")
        } else if e.is_connect() {
            ChatError::generation("Failed to connect to Ollama. Is it running? Try: ollama serve")
        } else {
            ChatError::generation(format!("Request failed: {e}"))
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            stream: false,
        };

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(attempt, model = %self.config.model, "Ollama request");

            let (error, is_retryable) = match self
                .client
                .post(self.chat_url())
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        ChatError::generation(format!("Failed to read response: {e}"))
                    })?;

                    if status.is_success() {
                        let response: OllamaResponse = serde_json::from_str(&body).map_err(|e| {
                            ChatError::generation(format!("Failed to parse response: {e}"))
                        })?;
                        return Ok(response.message.content);
                    }
                    Self::parse_error(status, &body)
                }
                Err(e) => (Self::request_error(&e), e.is_timeout() || e.is_connect()),
            };

            if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                return Err(error);
            }

            warn!(
                "Ollama request failed (attempt {}), retrying in {:?}: {}",
                attempt, delay, error
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = OllamaConfig::new("qwen2.5-coder");
        assert_eq!(config.model, "qwen2.5-coder");
        assert_eq!(config.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_with_url_trims_slash() {
        let config = OllamaConfig::default().with_url("http://gpu-box:11434/");
        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_config_with_timeout() {
        let config = OllamaConfig::default().with_timeout(30);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_convert_messages() {
        let messages = vec![Message::system("You are helpful."), Message::user("Hello")];

        let converted = OllamaClient::convert_messages(&messages);

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
    }

    #[test]
    fn test_chat_url() {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        assert_eq!(client.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_request_disables_streaming() {
        let request = OllamaRequest {
            model: "qwen2.5-coder".to_string(),
            messages: OllamaClient::convert_messages(&[Message::user("hi")]),
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
        assert_eq!(json["messages"][0]["content"], serde_json::json!("hi"));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"model":"qwen2.5-coder","message":{"role":"assistant","content":"SELECT 1;"},"done":true}"#;
        let response: OllamaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message.content, "SELECT 1;");
    }

    #[test]
    fn test_parse_error_model_missing() {
        let (err, retryable) = OllamaClient::parse_error(
            StatusCode::NOT_FOUND,
            r#"{"error":"model 'qwen2.5-coder' not found"}"#,
        );
        assert!(!retryable);
        assert!(matches!(err, ChatError::Generation(_)));
        assert!(err.to_string().contains("model 'qwen2.5-coder' not found"));
    }

    #[test]
    fn test_parse_error_server_error_is_retryable() {
        let (_, retryable) =
            OllamaClient::parse_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(retryable);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_error() {
        let config = OllamaConfig::default()
            .with_url("http://127.0.0.1:1")
            .with_timeout(2);
        let client = OllamaClient::new(config).unwrap();

        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));
    }
}
