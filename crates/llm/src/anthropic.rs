//! Anthropic backend with native tool use
//!
//! Implements the Messages API. Tools bind as native `input_schema`
//! definitions and invocations come back as `tool_use` content blocks, so no
//! argument string parsing is involved.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use callflow_core::{FinishReason, Message, Role, ToolCall, ToolDefinition};

use crate::adapter::to_anthropic_tool;
use crate::backend::{ChatBackend, ChatOutcome};
use crate::LlmError;

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic backend
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY or direct)
    pub api_key: String,
    /// Model ID
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Endpoint override (proxy)
    pub endpoint: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            endpoint: ANTHROPIC_ENDPOINT.to_string(),
        }
    }
}

impl AnthropicConfig {
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
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Anthropic chat backend with bound tools
pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: Client,
    bound_tools: Vec<Value>,
}

impl AnthropicBackend {
    /// Create an Anthropic backend with `tools` bound
    pub fn new(config: AnthropicConfig, tools: &[ToolDefinition]) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        for tool in tools {
            crate::adapter::validate_bindable(tool)?;
        }
        let bound_tools = tools.iter().map(to_anthropic_tool).collect();

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            bound_tools,
        })
    }

    /// The Messages API takes the system prompt out of band and only
    /// user/assistant roles in the message list.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
        let system = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.clone());

        let wire = messages
            .iter()
            .filter(|m| !matches!(m.role, Role::System))
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant".to_string(),
                    // Tool results come back as user messages
                    Role::User | Role::Tool => "user".to_string(),
                    Role::System => unreachable!(),
                },
                content: m.content.clone(),
            })
            .collect();

        (system, wire)
    }

    fn parse_response(response: ApiResponse) -> ChatOutcome {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        Value::Object(map) => map.into_iter().collect(),
                        _ => Default::default(),
                    };
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
            }
        }

        let finish = match response.stop_reason {
            StopReason::ToolUse => FinishReason::ToolCalls,
            StopReason::MaxTokens => FinishReason::Length,
            StopReason::EndTurn | StopReason::StopSequence => FinishReason::Stop,
        };

        ChatOutcome {
            text: if text.trim().is_empty() { None } else { Some(text) },
            tool_calls,
            finish,
        }
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn chat(&self, messages: &[Message]) -> Result<ChatOutcome, LlmError> {
        let (system, wire_messages) = Self::convert_messages(messages);

        let request = ApiRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: wire_messages,
            system,
            tools: if self.bound_tools.is_empty() {
                None
            } else {
                Some(self.bound_tools.clone())
            },
            temperature: Some(self.config.temperature),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(Self::parse_response(response))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: StopReason,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}
