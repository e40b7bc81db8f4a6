//! Backend factory
//!
//! Creates a bound chat backend from configuration. Construction-time
//! differences (endpoint, key sourcing, parameter shape) live here and in
//! each variant's constructor; nothing provider-specific leaks into the
//! decide or orchestration logic.

use std::sync::Arc;
use std::time::Duration;

use callflow_config::{LlmProvider, LlmSettings};
use callflow_core::{TelephonyContext, ToolDefinition};

use crate::adapter::BoundToolset;
use crate::anthropic::{AnthropicBackend, AnthropicConfig};
use crate::backend::{ChatBackend, OpenAiCompatBackend, OpenAiCompatConfig};
use crate::groq::{GroqBackend, GroqConfig};
use crate::model::AutopilotModel;
use crate::LlmError;

pub struct ModelFactory;

impl ModelFactory {
    /// Create a backend with `tools` bound, per the configured provider
    pub fn create_backend(
        settings: &LlmSettings,
        tools: &[ToolDefinition],
    ) -> Result<Arc<dyn ChatBackend>, LlmError> {
        let api_key = settings.resolve_api_key().ok_or_else(|| {
            LlmError::Configuration(format!(
                "no API key for provider (set llm.api_key or {})",
                settings.provider.api_key_var()
            ))
        })?;
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        match settings.provider {
            LlmProvider::Groq => {
                let config = GroqConfig {
                    api_key,
                    model: settings.model.clone(),
                    max_tokens: settings.max_tokens,
                    temperature: settings.temperature,
                    timeout,
                    endpoint: settings.endpoint.clone(),
                };
                Ok(Arc::new(GroqBackend::new(config, tools)?))
            }

            LlmProvider::OpenAi => {
                let mut config = OpenAiCompatConfig::openai(api_key, &settings.model)
                    .with_max_tokens(settings.max_tokens)
                    .with_temperature(settings.temperature)
                    .with_timeout(timeout);
                if let Some(endpoint) = &settings.endpoint {
                    config = config.with_endpoint(endpoint);
                }
                Ok(Arc::new(OpenAiCompatBackend::new(config, tools)?))
            }

            LlmProvider::Anthropic => {
                let mut config = AnthropicConfig::new(api_key)
                    .with_model(&settings.model)
                    .with_max_tokens(settings.max_tokens)
                    .with_temperature(settings.temperature);
                config.timeout = timeout;
                if let Some(endpoint) = &settings.endpoint {
                    config.endpoint = endpoint.clone();
                }
                Ok(Arc::new(AnthropicBackend::new(config, tools)?))
            }
        }
    }

    /// Create a full model: backend plus validated tool set plus context,
    /// with an empty conversation.
    pub fn create_model(
        settings: &LlmSettings,
        tools: Vec<ToolDefinition>,
        context: &TelephonyContext,
        decide_timeout: Duration,
    ) -> Result<AutopilotModel, LlmError> {
        let backend = Self::create_backend(settings, &tools)?;
        let toolset = BoundToolset::new(tools)?;
        Ok(AutopilotModel::new(backend, toolset, context, decide_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ToolBuilder;

    fn settings(provider: LlmProvider) -> LlmSettings {
        LlmSettings {
            provider,
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_backend_per_provider() {
        for provider in [LlmProvider::Groq, LlmProvider::OpenAi, LlmProvider::Anthropic] {
            let backend = ModelFactory::create_backend(&settings(provider), &[]).unwrap();
            assert_eq!(backend.model_name(), "test-model");
        }
    }

    #[test]
    fn test_create_backend_without_key_fails() {
        let mut s = settings(LlmProvider::Groq);
        s.api_key = None;
        if std::env::var("GROQ_API_KEY").is_err() {
            assert!(matches!(
                ModelFactory::create_backend(&s, &[]),
                Err(LlmError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_create_model_binds_tools() {
        let tools = vec![ToolBuilder::new("hangup", "End the call").build()];
        let context = TelephonyContext::new("+15550100", "+15550111");
        let model = ModelFactory::create_model(
            &settings(LlmProvider::Groq),
            tools,
            &context,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(model.toolset().len(), 1);
        assert!(model.conversation().is_empty());
    }

    #[test]
    fn test_create_model_rejects_bad_toolset() {
        let tools = vec![ToolDefinition::new(
            "bad",
            "bad",
            serde_json::json!({"type": "array"}),
        )];
        let context = TelephonyContext::new("a", "b");
        assert!(ModelFactory::create_model(
            &settings(LlmProvider::Groq),
            tools,
            &context,
            Duration::from_secs(5),
        )
        .is_err());
    }
}
