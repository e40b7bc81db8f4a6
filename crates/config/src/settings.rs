//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Language-model provider selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Groq,
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Some(LlmProvider::Groq),
            "openai" | "gpt" => Some(LlmProvider::OpenAi),
            "anthropic" | "claude" => Some(LlmProvider::Anthropic),
            _ => None,
        }
    }

    /// Environment variable conventionally holding this provider's key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "GROQ_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Language-model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider backend
    #[serde(default)]
    pub provider: LlmProvider,

    /// API key; falls back to the provider's conventional env var
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name or ID
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint override (proxy or self-hosted gateway)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Maximum tokens per decision
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_max_tokens() -> usize {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            model: default_model(),
            endpoint: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LlmSettings {
    /// Resolve the API key from settings or the provider's env var
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.provider.api_key_var()).ok())
    }
}

/// Session orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Timeout for one language-model decide call, in milliseconds
    #[serde(default = "default_decide_timeout_ms")]
    pub decide_timeout_ms: u64,

    /// Timeout for one verb operation, in milliseconds
    #[serde(default = "default_verb_timeout_ms")]
    pub verb_timeout_ms: u64,

    /// Bounded retries for a failed/timed-out decide call before the
    /// spoken fallback. A live call cannot absorb unlimited retry.
    #[serde(default = "default_max_provider_retries")]
    pub max_provider_retries: u32,

    /// Spoken line used when the provider stays unavailable
    #[serde(default = "default_fallback_line")]
    pub fallback_line: String,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Per-session event queue depth
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_decide_timeout_ms() -> u64 {
    10_000
}
fn default_verb_timeout_ms() -> u64 {
    5_000
}
fn default_max_provider_retries() -> u32 {
    1
}
fn default_fallback_line() -> String {
    "I'm having trouble at the moment, please hold.".to_string()
}
fn default_max_sessions() -> usize {
    1000
}
fn default_event_queue_depth() -> usize {
    64
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            decide_timeout_ms: default_decide_timeout_ms(),
            verb_timeout_ms: default_verb_timeout_ms(),
            max_provider_retries: default_max_provider_retries(),
            fallback_line: default_fallback_line(),
            max_sessions: default_max_sessions(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Language-model configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Session orchestration configuration
    #[serde(default)]
    pub session: SessionSettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_llm()?;
        self.validate_session()?;
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if self.llm.model.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model".to_string(),
                message: "model must not be empty".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.request_timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_strict() && self.llm.resolve_api_key().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "llm.api_key".to_string(),
                message: format!(
                    "API key required in {} mode (set llm.api_key or {})",
                    if self.environment.is_production() {
                        "production"
                    } else {
                        "staging"
                    },
                    self.llm.provider.api_key_var()
                ),
            });
        } else if self.llm.resolve_api_key().is_none() {
            tracing::warn!(
                provider = ?self.llm.provider,
                "No API key configured (required before taking live calls)"
            );
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.decide_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.decide_timeout_ms".to_string(),
                message: "decide timeout must be at least 1ms".to_string(),
            });
        }

        if session.verb_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.verb_timeout_ms".to_string(),
                message: "verb timeout must be at least 1ms".to_string(),
            });
        }

        if session.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_sessions".to_string(),
                message: "max sessions must be at least 1".to_string(),
            });
        }

        if session.event_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.event_queue_depth".to_string(),
                message: "event queue depth must be at least 1".to_string(),
            });
        }

        if session.fallback_line.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.fallback_line".to_string(),
                message: "fallback line must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CALLFLOW prefix, `__` separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALLFLOW")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
