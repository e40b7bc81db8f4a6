//! Conversation state
//!
//! Append-only ordered turn history, owned exclusively by one model instance
//! and destroyed with the session. Prior turns are never rewritten; a decide
//! cycle that fails before the provider answers leaves the history exactly
//! as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use callflow_core::{Message, ToolCall};

/// What happened in one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnKind {
    /// Caller utterance or call event fed to the model
    User { text: String },
    /// Model utterance spoken on the call
    Assistant { text: String },
    /// Tool invocation the model asked for
    ToolCall { call: ToolCall },
    /// Result of a dispatched tool, fed back to the model
    ToolResult {
        call_id: String,
        name: String,
        content: serde_json::Value,
    },
    /// A failed decision step recorded for the model to see
    Error { message: String },
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TurnKind,
}

impl Turn {
    fn new(kind: TurnKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

/// Append-only turn history for one session
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(TurnKind::User { text: text.into() }));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns
            .push(Turn::new(TurnKind::Assistant { text: text.into() }));
    }

    pub fn push_tool_call(&mut self, call: ToolCall) {
        self.turns.push(Turn::new(TurnKind::ToolCall { call }));
    }

    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: serde_json::Value,
    ) {
        self.turns.push(Turn::new(TurnKind::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            content,
        }));
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.turns.push(Turn::new(TurnKind::Error {
            message: message.into(),
        }));
    }

    /// Render the history as provider-neutral chat messages, prefixed with
    /// the system prompt. Tool activity is rendered inline: calls as
    /// assistant turns, results and errors as tool turns.
    pub fn to_messages(&self, system_prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(Message::system(system_prompt));

        for turn in &self.turns {
            match &turn.kind {
                TurnKind::User { text } => messages.push(Message::user(text.clone())),
                TurnKind::Assistant { text } => messages.push(Message::assistant(text.clone())),
                TurnKind::ToolCall { call } => messages.push(Message::assistant(format!(
                    "[tool call] {} {}",
                    call.name,
                    call.arguments_value()
                ))),
                TurnKind::ToolResult { name, content, .. } => {
                    messages.push(Message::tool(format!("[{} result] {}", name, content)))
                }
                TurnKind::Error { message } => {
                    messages.push(Message::tool(format!("[error] {}", message)))
                }
            }
        }

        messages
    }
}
