//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients from the
//! `[llm]` configuration section.

use crate::config::LlmConfig;
use crate::error::{ChatError, Result};
use crate::llm::{
    LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client for the configured provider.
///
/// For OpenAI-compatible endpoints the API key is resolved in order:
/// 1. `api_key` from the configuration
/// 2. The `OPENAI_API_KEY` environment variable
///
/// A key is only required when talking to the OpenAI API itself; local
/// servers behind a custom `base_url` may run without one.
pub fn create_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(ChatError::config)?;

    match provider {
        LlmProvider::Ollama => {
            let mut ollama = OllamaConfig::new(&config.model).with_timeout(config.timeout_secs);
            if let Some(url) = &config.base_url {
                ollama = ollama.with_url(url);
            }
            Ok(Box::new(OllamaClient::new(ollama)?))
        }
        LlmProvider::OpenAi => {
            let mut openai = OpenAiConfig::new(&config.model).with_timeout(config.timeout_secs);
            if let Some(url) = &config.base_url {
                openai = openai.with_url(url);
            }

            let key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            match key {
                Some(key) => openai = openai.with_api_key(key),
                None if config.base_url.is_none() => {
                    return Err(ChatError::config(
                        "No API key configured. Set llm.api_key or OPENAI_API_KEY.",
                    ));
                }
                None => {}
            }
            Ok(Box::new(OpenAiClient::new(openai)?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
