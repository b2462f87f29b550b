//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns and records
//! every request it receives.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Clones share the request log.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    /// Artificial delay before answering.
    latency: Option<Duration>,
    /// Every message list received, in order.
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the request contains `pattern`, the mock will return `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail as an unreachable model would.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Delays every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns every message list received so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("all customers") {
            return "```sql\nSELECT * FROM customers;\n```".to_string();
        }

        if input_lower.contains("count") && input_lower.contains("orders") {
            return "```sql\nSELECT COUNT(*) FROM orders;\n```".to_string();
        }

        if input_lower.contains("add") && input_lower.contains("customer") {
            return "```sql\nINSERT INTO customers (name) VALUES ('New Customer');\n```"
                .to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = &self.failure {
            return Err(ChatError::generation(message.clone()));
        }

        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_select_all_customers() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("Show me all customers")];

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("SELECT * FROM customers"));
    }

    #[tokio::test]
    async fn test_mock_returns_unknown_response() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("What is the meaning of life?")];

        let response = client.complete(&messages).await.unwrap();

        assert!(response.contains("don't understand"));
    }

    #[tokio::test]
    async fn test_mock_custom_response_takes_precedence() {
        let client = MockLlmClient::new().with_response("all customers", "`sql\nSELECT 1;\n`");

        let messages = vec![Message::user("Show me all customers")];
        let response = client.complete(&messages).await.unwrap();

        assert_eq!(response, "`sql\nSELECT 1;\n`");
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let client = MockLlmClient::new().failing("Failed to connect to Ollama");
        let err = client
            .complete(&[Message::user("anything")])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));
    }

    #[tokio::test]
    async fn test_mock_records_requests_across_clones() {
        let client = MockLlmClient::new();
        let observer = client.clone();

        client
            .complete(&[Message::system("schema"), Message::user("count orders")])
            .await
            .unwrap();

        let requests = observer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].content, "schema");
    }
}
