//! Session identity and per-call telephony context

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque identifier of one call leg on the control channel.
///
/// Unique per active call, invalid after the call ends, never reused.
/// The channel mints these; the loop only carries them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRef(String);

impl SessionRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Direction of the call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    #[default]
    Inbound,
    Outbound,
}

/// Read-mostly per-session call state shared by every decision cycle.
///
/// Built once when the session is created; the orchestrator may update
/// metadata between cycles, never concurrently with one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyContext {
    /// Caller identifier (E.164 or SIP URI)
    pub caller: String,
    /// Callee identifier
    pub callee: String,
    /// BCP 47 language tag for the conversation
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Direction of this leg
    #[serde(default)]
    pub direction: CallDirection,
    /// Free-form call metadata (trunk, application, custom headers)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl TelephonyContext {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
            locale: default_locale(),
            direction: CallDirection::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_direction(mut self, direction: CallDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
