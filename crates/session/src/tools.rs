//! Call-control tool set
//!
//! The tools surfaced to the model for driving the call. Each name resolves
//! to exactly one verb handler; anything else never reaches dispatch.
//! Answering is not a tool (the orchestrator answers before any
//! conversation exists) and speaking rides on the decision's text rather
//! than a tool call.

use callflow_core::ToolDefinition;
use callflow_llm::ToolBuilder;

/// Tool definitions for the call-control verbs the model may invoke
pub fn call_control_tools() -> Vec<ToolDefinition> {
    vec![
        ToolBuilder::new(
            "hangup",
            "End the call. Use when the conversation is complete or the caller asks to stop.",
        )
        .build(),
        ToolBuilder::new(
            "dial",
            "Transfer the call to another destination, such as a human agent.",
        )
        .param(
            "target",
            "string",
            "Destination to transfer to (phone number or SIP URI)",
            true,
        )
        .build(),
        ToolBuilder::new(
            "play",
            "Play an audio file to the caller instead of synthesized speech.",
        )
        .param("url", "string", "URL of the audio to play", true)
        .build(),
        ToolBuilder::new(
            "gather",
            "Listen for the caller's next response, by speech or keypad.",
        )
        .param("source", "string", "Where to collect input from", false)
        .string_enum("source", &["speech", "dtmf", "speech_and_dtmf"])
        .param("timeout_ms", "integer", "How long to wait, in milliseconds", false)
        .param("max_digits", "integer", "Maximum keypad digits to collect", false)
        .build(),
        ToolBuilder::new("mute", "Stop sending the caller's audio.").build(),
        ToolBuilder::new("unmute", "Resume sending the caller's audio.").build(),
        ToolBuilder::new(
            "send_dtmf",
            "Send keypad tones on the call, for example to navigate an IVR.",
        )
        .param("digits", "string", "Digits to send (0-9, *, #, A-D)", true)
        .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use callflow_llm::BoundToolset;
    use callflow_verbs::Verb;

    #[test]
    fn test_toolset_binds_cleanly() {
        let toolset = BoundToolset::new(call_control_tools()).unwrap();
        assert_eq!(toolset.len(), 7);
    }

    #[test]
    fn test_every_tool_resolves_to_exactly_one_verb() {
        for tool in call_control_tools() {
            let verb = Verb::from_tool_name(&tool.name);
            assert!(verb.is_some(), "tool {:?} resolves to no verb", tool.name);
            assert_eq!(verb.unwrap().tool_name(), tool.name);
        }
    }

    #[test]
    fn test_gather_arguments_validate() {
        let toolset = BoundToolset::new(call_control_tools()).unwrap();
        assert!(toolset
            .validate_arguments(
                "gather",
                &serde_json::json!({"source": "speech", "timeout_ms": 5000})
            )
            .is_ok());
        assert!(toolset
            .validate_arguments("gather", &serde_json::json!({"source": "telepathy"}))
            .is_err());
    }
}
