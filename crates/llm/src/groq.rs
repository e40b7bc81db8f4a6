//! Groq backend
//!
//! Groq serves an OpenAI-compatible chat-completions API, so this variant is
//! construction only: it builds the shared OpenAI-compatible client against
//! the Groq endpoint and inherits the chat contract unchanged.

use std::time::Duration;

use async_trait::async_trait;

use callflow_core::{Message, ToolDefinition};

use crate::backend::{ChatBackend, ChatOutcome, OpenAiCompatBackend, OpenAiCompatConfig};
use crate::LlmError;

const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";

/// Configuration for the Groq backend
#[derive(Debug, Clone)]
pub struct GroqConfig {
    /// API key (from GROQ_API_KEY or direct)
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Endpoint override (proxy); defaults to the Groq API
    pub endpoint: Option<String>,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            model: "llama-3.3-70b-versatile".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            endpoint: None,
        }
    }
}

impl GroqConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Groq chat backend with bound tools
pub struct GroqBackend {
    inner: OpenAiCompatBackend,
}

impl GroqBackend {
    /// Create a Groq backend with `tools` bound
    pub fn new(config: GroqConfig, tools: &[ToolDefinition]) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "GROQ_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| GROQ_ENDPOINT.to_string());
        let inner_config = OpenAiCompatConfig {
            endpoint,
            api_key: config.api_key,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
        };

        Ok(Self {
            inner: OpenAiCompatBackend::new(inner_config, tools)?,
        })
    }
}

#[async_trait]
impl ChatBackend for GroqBackend {
    async fn chat(&self, messages: &[Message]) -> Result<ChatOutcome, LlmError> {
        self.inner.chat(messages).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = GroqConfig::new("gsk-test")
            .with_model("llama-3.1-8b-instant")
            .with_max_tokens(256)
            .with_temperature(0.2);

        assert_eq!(config.api_key, "gsk-test");
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn test_backend_requires_api_key() {
        let config = GroqConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            GroqBackend::new(config, &[]),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_backend_model_name() {
        let backend = GroqBackend::new(GroqConfig::new("gsk-test"), &[]).unwrap();
        assert_eq!(backend.model_name(), "llama-3.3-70b-versatile");
    }
}
