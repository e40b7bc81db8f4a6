//! Language-model abstraction for the call autopilot
//!
//! One conversational decision interface regardless of backend provider:
//! - `ChatBackend` trait with Groq, OpenAI-compatible and Anthropic variants
//! - Pure tool adapters converting application tools to each provider's
//!   function-calling representation
//! - `AutopilotModel`, which owns the conversation state and turns call
//!   events into decisions (speak, invoke tools, or both)
//!
//! Variants differ only in how the provider client is constructed and bound;
//! the decide contract and conversation handling are identical across all of
//! them.

pub mod adapter;
pub mod anthropic;
pub mod backend;
pub mod conversation;
pub mod factory;
pub mod groq;
pub mod model;

pub use adapter::{to_anthropic_tool, to_openai_tool, BoundToolset, ToolBuilder};
pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use backend::{ChatBackend, ChatOutcome, OpenAiCompatBackend, OpenAiCompatConfig};
pub use conversation::{ConversationState, Turn, TurnKind};
pub use factory::ModelFactory;
pub use groq::{GroqBackend, GroqConfig};
pub use model::{AutopilotModel, Decision};

use thiserror::Error;

/// Language-model errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tool set rejected at bind time (before any call is live)
    #[error("tool binding error: {0}")]
    Binding(String),

    /// Model-produced arguments failed schema validation
    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl LlmError {
    /// Whether the conversation was left unchanged and a retry is safe.
    /// Unreachable, rate-limited and malformed-output failures all qualify;
    /// binding and configuration problems do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_)
                | LlmError::Timeout
                | LlmError::Api(_)
                | LlmError::InvalidResponse(_)
        )
    }
}
