//! Verb request/response wire protocol
//!
//! Shapes exchanged between the decision loop and the call-control channel:
//! `{ sessionRef, verb, params }` in, `{ sessionRef, verb, result | error }`
//! out. Requests are immutable once constructed and are never pipelined per
//! session, so a response correlates by sessionRef plus request identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use callflow_core::{DialTarget, GatherSource, SessionRef};

/// Verb discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verb {
    Answer,
    Say,
    Play,
    Gather,
    Dial,
    Hangup,
    Mute,
    Unmute,
    SendDtmf,
}

impl Verb {
    /// Name on the wire, matching the serde rename
    pub fn wire_name(&self) -> &'static str {
        match self {
            Verb::Answer => "answer",
            Verb::Say => "say",
            Verb::Play => "play",
            Verb::Gather => "gather",
            Verb::Dial => "dial",
            Verb::Hangup => "hangup",
            Verb::Mute => "mute",
            Verb::Unmute => "unmute",
            Verb::SendDtmf => "sendDtmf",
        }
    }

    /// Snake-case name used when the verb is surfaced as a model tool
    pub fn tool_name(&self) -> &'static str {
        match self {
            Verb::Answer => "answer",
            Verb::Say => "say",
            Verb::Play => "play",
            Verb::Gather => "gather",
            Verb::Dial => "dial",
            Verb::Hangup => "hangup",
            Verb::Mute => "mute",
            Verb::Unmute => "unmute",
            Verb::SendDtmf => "send_dtmf",
        }
    }

    /// Resolve a model tool name back to a verb
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "answer" => Some(Verb::Answer),
            "say" => Some(Verb::Say),
            "play" => Some(Verb::Play),
            "gather" => Some(Verb::Gather),
            "dial" | "transfer" => Some(Verb::Dial),
            "hangup" => Some(Verb::Hangup),
            "mute" => Some(Verb::Mute),
            "unmute" => Some(Verb::Unmute),
            "send_dtmf" => Some(Verb::SendDtmf),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool_name())
    }
}

/// Verb-specific parameters, tagged by verb on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", content = "params", rename_all = "camelCase")]
pub enum VerbParams {
    Answer,
    Say {
        text: String,
    },
    Play {
        url: String,
    },
    Gather {
        #[serde(default)]
        source: GatherSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_digits: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_on_key: Option<char>,
    },
    Dial {
        target: DialTarget,
    },
    Hangup,
    Mute,
    Unmute,
    SendDtmf {
        digits: String,
    },
}

impl VerbParams {
    pub fn verb(&self) -> Verb {
        match self {
            VerbParams::Answer => Verb::Answer,
            VerbParams::Say { .. } => Verb::Say,
            VerbParams::Play { .. } => Verb::Play,
            VerbParams::Gather { .. } => Verb::Gather,
            VerbParams::Dial { .. } => Verb::Dial,
            VerbParams::Hangup => Verb::Hangup,
            VerbParams::Mute => Verb::Mute,
            VerbParams::Unmute => Verb::Unmute,
            VerbParams::SendDtmf { .. } => Verb::SendDtmf,
        }
    }

    /// Build params for a verb from loose JSON arguments (a model tool call).
    ///
    /// Fails with a description when the arguments do not match the verb's
    /// parameter shape; nothing is dispatched in that case. Null or empty
    /// arguments are accepted for parameterless verbs.
    pub fn from_tool_arguments(
        verb: Verb,
        arguments: serde_json::Value,
    ) -> Result<Self, String> {
        let tag = |params: Option<serde_json::Value>| {
            let mut tagged = serde_json::Map::new();
            tagged.insert(
                "verb".to_string(),
                serde_json::Value::String(verb.wire_name().to_string()),
            );
            if let Some(params) = params {
                tagged.insert("params".to_string(), params);
            }
            serde_json::from_value::<Self>(serde_json::Value::Object(tagged))
        };
        let empty = matches!(&arguments, serde_json::Value::Null)
            || matches!(&arguments, serde_json::Value::Object(m) if m.is_empty());
        let parsed = if empty {
            // Parameterless verbs take no params entry; verbs whose
            // parameters are all optional take an empty object
            tag(None).or_else(|_| tag(Some(serde_json::json!({}))))
        } else {
            tag(Some(arguments))
        };
        parsed.map_err(|e| format!("invalid {} arguments: {}", verb, e))
    }
}

/// A request against one call leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbRequest {
    pub session_ref: SessionRef,
    #[serde(flatten)]
    pub params: VerbParams,
}

impl VerbRequest {
    pub fn new(session_ref: impl Into<SessionRef>, params: VerbParams) -> Self {
        Self {
            session_ref: session_ref.into(),
            params,
        }
    }

    pub fn verb(&self) -> Verb {
        self.params.verb()
    }
}

/// Response error codes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ChannelError,
    NotFound,
    Timeout,
    Unknown,
}

/// Structured error payload of a failed verb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbError {
    pub code: ErrorCode,
    pub message: String,
}

impl VerbError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for VerbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Result or error of one verb execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerbOutcome {
    Result(serde_json::Value),
    Error(VerbError),
}

/// Exactly one response per request, carrying the request's sessionRef
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbResponse {
    pub session_ref: SessionRef,
    pub verb: Verb,
    #[serde(flatten)]
    pub outcome: VerbOutcome,
}

impl VerbResponse {
    /// Success with an empty result object
    pub fn ok(session_ref: SessionRef, verb: Verb) -> Self {
        Self::with_result(session_ref, verb, serde_json::json!({}))
    }

    pub fn with_result(session_ref: SessionRef, verb: Verb, result: serde_json::Value) -> Self {
        Self {
            session_ref,
            verb,
            outcome: VerbOutcome::Result(result),
        }
    }

    pub fn error(
        session_ref: SessionRef,
        verb: Verb,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_ref,
            verb,
            outcome: VerbOutcome::Error(VerbError::new(code, message)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, VerbOutcome::Error(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.outcome {
            VerbOutcome::Error(e) => Some(e.code),
            VerbOutcome::Result(_) => None,
        }
    }
}
