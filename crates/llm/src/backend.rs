//! Chat backend abstraction and the OpenAI-compatible implementation
//!
//! A `ChatBackend` is a provider client with its tool set already bound:
//! construction adapts and validates the tools (see `adapter`), so a backend
//! that exists can always be called. The `chat` contract is identical across
//! providers; only construction differs per variant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use callflow_core::{FinishReason, Message, Role, ToolCall, ToolDefinition};

use crate::adapter::to_openai_tool;
use crate::LlmError;

/// One decision from the provider: spoken text, tool calls, or both
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish: FinishReason,
}

impl ChatOutcome {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Provider client with bound tools
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Complete the conversation; authentication, streaming and rate limits
    /// are the implementation's concern.
    async fn chat(&self, messages: &[Message]) -> Result<ChatOutcome, LlmError>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Configuration for OpenAI-compatible chat-completions providers
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// API endpoint base (e.g. https://api.openai.com/v1)
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

impl OpenAiCompatConfig {
    /// Config for OpenAI
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI-compatible backend with function calling.
///
/// Works with OpenAI and any chat-completions-compatible gateway; the Groq
/// variant constructs one of these against the Groq endpoint.
pub struct OpenAiCompatBackend {
    config: OpenAiCompatConfig,
    client: Client,
    /// Adapter-converted tool array, fixed at bind time
    bound_tools: Vec<Value>,
}

impl OpenAiCompatBackend {
    /// Create a backend with `tools` bound. Inexpressible tools fail here.
    pub fn new(config: OpenAiCompatConfig, tools: &[ToolDefinition]) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "API key required for OpenAI-compatible endpoint".to_string(),
            ));
        }

        for tool in tools {
            crate::adapter::validate_bindable(tool)?;
        }
        let bound_tools = tools.iter().map(to_openai_tool).collect();

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

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                    // Tool results ride as user turns; the proper tool role
                    // requires call-id threading the flat history dropped
                    Role::Tool => "user".to_string(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn parse_tool_calls(calls: Vec<WireToolCall>) -> Result<Vec<ToolCall>, LlmError> {
        calls
            .into_iter()
            .map(|c| {
                let arguments: Value = serde_json::from_str(&c.function.arguments)
                    .map_err(|e| {
                        LlmError::InvalidResponse(format!(
                            "tool call {:?} has unparseable arguments: {}",
                            c.function.name, e
                        ))
                    })?;
                let arguments = match arguments {
                    Value::Object(map) => map.into_iter().collect(),
                    Value::Null => Default::default(),
                    other => {
                        return Err(LlmError::InvalidResponse(format!(
                            "tool call {:?} arguments are not an object: {}",
                            c.function.name, other
                        )))
                    }
                };
                Ok(ToolCall {
                    id: c
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: c.function.name,
                    arguments,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn chat(&self, messages: &[Message]) -> Result<ChatOutcome, LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            tools: if self.bound_tools.is_empty() {
                None
            } else {
                Some(self.bound_tools.clone())
            },
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let tool_calls = Self::parse_tool_calls(choice.message.tool_calls)?;
        let finish = match choice.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };

        Ok(ChatOutcome {
            text: choice.message.content.filter(|t| !t.trim().is_empty()),
            tool_calls,
            finish,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI-compatible API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}
