//! The abstract language model
//!
//! `AutopilotModel` gives the orchestrator one decision interface regardless
//! of backend. It owns the session's conversation state and the bound tool
//! set; `decide` appends the latest event, invokes the provider, and returns
//! spoken text, sequenced tool invocations, or both.
//!
//! The conversation is only advanced once the provider has answered: a
//! failed or timed-out call leaves the history untouched, so the caller may
//! retry decide with identical state before any tool side effect exists.

use std::sync::Arc;
use std::time::Duration;

use callflow_core::{TelephonyContext, ToolCall};

use crate::adapter::BoundToolset;
use crate::backend::ChatBackend;
use crate::conversation::ConversationState;
use crate::LlmError;

/// One decision: what to speak and which tools to invoke, in order.
///
/// Tool invocations are sequenced, never parallel; verbs mutate the same
/// call leg.
#[derive(Debug, Clone)]
pub struct Decision {
    pub say: Option<String>,
    pub tool_invocations: Vec<ToolCall>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.say.is_none() && self.tool_invocations.is_empty()
    }
}

/// Provider-abstracted conversational decision maker for one session
pub struct AutopilotModel {
    backend: Arc<dyn ChatBackend>,
    toolset: BoundToolset,
    system_prompt: String,
    conversation: ConversationState,
    decide_timeout: Duration,
}

impl AutopilotModel {
    /// Bind a backend, tool set and telephony context into a model with an
    /// empty conversation.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        toolset: BoundToolset,
        context: &TelephonyContext,
        decide_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            toolset,
            system_prompt: build_system_prompt(context),
            conversation: ConversationState::new(),
            decide_timeout,
        }
    }

    /// Append application instructions (greeting policy, persona) to the
    /// system prompt. Only meaningful before the first decide call.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.system_prompt.push_str("\n\n");
        self.system_prompt.push_str(instructions);
        self
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn toolset(&self) -> &BoundToolset {
        &self.toolset
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Decide the next action for the latest event/utterance.
    ///
    /// On provider failure or timeout the error is returned and the
    /// conversation is not advanced. Tool calls with arguments that fail
    /// schema validation never reach a handler; they are recorded as error
    /// turns and dropped from the decision.
    pub async fn decide(&mut self, event_text: &str) -> Result<Decision, LlmError> {
        let mut messages = self.conversation.to_messages(&self.system_prompt);
        messages.push(callflow_core::Message::user(event_text));

        let outcome = tokio::time::timeout(self.decide_timeout, self.backend.chat(&messages))
            .await
            .map_err(|_| LlmError::Timeout)??;

        // Provider answered; commit the event and the decision to history.
        self.conversation.push_user(event_text);

        if let Some(text) = &outcome.text {
            self.conversation.push_assistant(text.clone());
        }

        let mut invocations = Vec::with_capacity(outcome.tool_calls.len());
        for call in outcome.tool_calls {
            match self
                .toolset
                .validate_arguments(&call.name, &call.arguments_value())
            {
                Ok(()) => {
                    self.conversation.push_tool_call(call.clone());
                    invocations.push(call);
                }
                Err(err) => {
                    tracing::warn!(
                        tool = %call.name,
                        error = %err,
                        "Dropping tool call with invalid arguments"
                    );
                    self.conversation.push_error(err.to_string());
                }
            }
        }

        Ok(Decision {
            say: outcome.text,
            tool_invocations: invocations,
        })
    }

    /// Record the response of a dispatched tool as a tool-result turn
    pub fn record_tool_result(&mut self, call: &ToolCall, content: serde_json::Value) {
        self.conversation
            .push_tool_result(call.id.clone(), call.name.clone(), content);
    }

    /// Record a line the orchestrator spoke outside a decision (fallback)
    pub fn record_spoken_line(&mut self, text: &str) {
        self.conversation.push_assistant(text);
    }
}

fn build_system_prompt(context: &TelephonyContext) -> String {
    format!(
        "You are a voice autopilot operating a live phone call.\n\
         Caller: {caller}\nCallee: {callee}\nLanguage: {locale}\n\
         Keep spoken responses short and natural for audio. Use the provided \
         tools to act on the call; never describe an action instead of \
         invoking its tool. Hang up when the conversation is complete.",
        caller = context.caller,
        callee = context.callee,
        locale = context.locale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ToolBuilder;
    use crate::backend::ChatOutcome;
    use async_trait::async_trait;
    use callflow_core::{FinishReason, Message, ToolDefinition};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted backend: pops the next outcome per chat call.
    struct ScriptedBackend {
        script: Mutex<Vec<Result<ChatOutcome, LlmError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<ChatOutcome, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script),
                delay: None,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, _messages: &[Message]) -> Result<ChatOutcome, LlmError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock();
            if script.is_empty() {
                return Ok(text_outcome("..."));
            }
            script.remove(0)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn text_outcome(text: &str) -> ChatOutcome {
        ChatOutcome {
            text: Some(text.to_string()),
            tool_calls: vec![],
            finish: FinishReason::Stop,
        }
    }

    fn tool_outcome(name: &str, arguments: serde_json::Value) -> ChatOutcome {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        ChatOutcome {
            text: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: name.into(),
                arguments,
            }],
            finish: FinishReason::ToolCalls,
        }
    }

    fn say_tool() -> ToolDefinition {
        ToolBuilder::new("say", "Speak text")
            .param("text", "string", "Text to speak", true)
            .build()
    }

    fn model_with(backend: ScriptedBackend, tools: Vec<ToolDefinition>) -> AutopilotModel {
        let context = TelephonyContext::new("+15550100", "+15550111");
        AutopilotModel::new(
            Arc::new(backend),
            BoundToolset::new(tools).unwrap(),
            &context,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_decide_appends_user_and_assistant_turns() {
        let mut model = model_with(
            ScriptedBackend::new(vec![Ok(text_outcome("Hello, how can I help?"))]),
            vec![],
        );

        let decision = model.decide("call connected").await.unwrap();
        assert_eq!(decision.say.as_deref(), Some("Hello, how can I help?"));
        assert!(decision.tool_invocations.is_empty());
        assert_eq!(model.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_leaves_conversation_unchanged() {
        let mut model = model_with(
            ScriptedBackend::new(vec![
                Err(LlmError::Network("unreachable".into())),
                Ok(text_outcome("recovered")),
            ]),
            vec![],
        );

        let before = model.conversation().len();
        let err = model.decide("hello?").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(model.conversation().len(), before);

        // Retrying with unchanged state works
        let decision = model.decide("hello?").await.unwrap();
        assert_eq!(decision.say.as_deref(), Some("recovered"));
        assert_eq!(model.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_decide_timeout_leaves_conversation_unchanged() {
        let mut model = model_with(
            ScriptedBackend::new(vec![Ok(text_outcome("too late"))])
                .slow(Duration::from_secs(5)),
            vec![],
        );

        let err = model.decide("anyone there?").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout));
        assert_eq!(model.conversation().len(), 0);
    }

    #[tokio::test]
    async fn test_valid_tool_call_is_sequenced_and_recorded() {
        let mut model = model_with(
            ScriptedBackend::new(vec![Ok(tool_outcome(
                "say",
                serde_json::json!({"text": "hold please"}),
            ))]),
            vec![say_tool()],
        );

        let decision = model.decide("transfer me").await.unwrap();
        assert_eq!(decision.tool_invocations.len(), 1);
        assert_eq!(decision.tool_invocations[0].name, "say");
        // user turn + tool-call turn
        assert_eq!(model.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_arguments_short_circuit_to_error_turn() {
        let mut model = model_with(
            ScriptedBackend::new(vec![Ok(tool_outcome(
                "say",
                serde_json::json!({"volume": 11}),
            ))]),
            vec![say_tool()],
        );

        let decision = model.decide("say something").await.unwrap();
        assert!(decision.tool_invocations.is_empty());

        let turns = model.conversation().turns();
        assert!(matches!(
            turns.last().unwrap().kind,
            crate::conversation::TurnKind::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_history_is_append_only_across_decides() {
        let mut model = model_with(
            ScriptedBackend::new(vec![
                Ok(text_outcome("first")),
                Ok(text_outcome("second")),
            ]),
            vec![],
        );

        model.decide("one").await.unwrap();
        let snapshot = model.conversation().turns().to_vec();

        model.decide("two").await.unwrap();
        assert!(model.conversation().len() > snapshot.len());
        assert_eq!(&model.conversation().turns()[..snapshot.len()], &snapshot);
    }

    #[tokio::test]
    async fn test_tool_result_recording() {
        let mut model = model_with(ScriptedBackend::new(vec![]), vec![]);
        let call = ToolCall {
            id: "call_1".into(),
            name: "answer".into(),
            arguments: HashMap::new(),
        };
        model.record_tool_result(&call, serde_json::json!({}));
        assert_eq!(model.conversation().len(), 1);
    }

    #[test]
    fn test_system_prompt_carries_context() {
        let context = TelephonyContext::new("+15550100", "+15550111").with_locale("fr-FR");
        let prompt = build_system_prompt(&context);
        assert!(prompt.contains("+15550100"));
        assert!(prompt.contains("+15550111"));
        assert!(prompt.contains("fr-FR"));
    }
}
