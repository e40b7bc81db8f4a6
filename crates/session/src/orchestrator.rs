//! Session orchestrator
//!
//! Owns one session's lifecycle: routes control-channel events to the model,
//! routes the model's decisions to verb handlers, and serializes the whole
//! interaction so the next decide/dispatch cycle never starts before the
//! prior one's response is recorded. Events that arrive while an operation
//! is outstanding queue up in arrival order; if one of them says the call
//! ended, the outstanding operation is drained but its effect discarded and
//! no further verbs are dispatched.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use callflow_config::SessionSettings;
use callflow_core::{CallEvent, SessionRef, ToolCall};
use callflow_llm::{AutopilotModel, Decision};
use callflow_verbs::{ErrorCode, Verb, VerbOutcome, VerbParams, VerbRegistry, VerbRequest};

use crate::state::SessionState;

/// Orchestrates one call leg from `Created` to `Closed`
pub struct SessionOrchestrator {
    session_ref: SessionRef,
    state: SessionState,
    model: AutopilotModel,
    registry: Arc<VerbRegistry>,
    settings: SessionSettings,
    events: mpsc::Receiver<CallEvent>,
    /// Events observed while an operation was outstanding, still in
    /// arrival order
    pending: VecDeque<CallEvent>,
}

impl SessionOrchestrator {
    /// Create the orchestrator and the sender used to feed it events
    pub fn new(
        session_ref: SessionRef,
        model: AutopilotModel,
        registry: Arc<VerbRegistry>,
        settings: SessionSettings,
    ) -> (Self, mpsc::Sender<CallEvent>) {
        let (tx, events) = mpsc::channel(settings.event_queue_depth);
        (
            Self {
                session_ref,
                state: SessionState::Created,
                model,
                registry,
                settings,
                events,
                pending: VecDeque::new(),
            },
            tx,
        )
    }

    /// Run the session to completion. Consumes the orchestrator; the
    /// conversation state and model binding are released on return.
    pub async fn run(mut self) {
        tracing::info!(
            session_ref = %self.session_ref,
            model = self.model.model_name(),
            "Session started"
        );

        while !self.state.is_closed() {
            match self.next_event().await {
                Some(event) => self.handle_event(event).await,
                None => {
                    // Event source gone (shutdown); hang up what we can
                    self.end(true).await;
                }
            }
        }

        tracing::info!(
            session_ref = %self.session_ref,
            turns = self.model.conversation().len(),
            "Session closed"
        );
    }

    async fn next_event(&mut self) -> Option<CallEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    /// Buffer everything already queued, preserving order, and report
    /// whether the call ended while we were busy.
    fn call_ended_while_busy(&mut self) -> bool {
        while let Ok(event) = self.events.try_recv() {
            self.pending.push_back(event);
        }
        self.pending.iter().any(|e| e.is_terminal())
    }

    async fn handle_event(&mut self, event: CallEvent) {
        if event.session_ref() != &self.session_ref {
            tracing::warn!(
                session_ref = %self.session_ref,
                event_ref = %event.session_ref(),
                "Dropping event addressed to another session"
            );
            return;
        }

        match event {
            CallEvent::Incoming { .. } => {
                if self.state == SessionState::Created {
                    self.answer_and_greet().await;
                } else {
                    tracing::warn!(
                        session_ref = %self.session_ref,
                        state = %self.state,
                        "Duplicate incoming event ignored"
                    );
                }
            }
            CallEvent::Answered { .. } => {
                // The answer dispatch already moved us to Conversing; a
                // late confirmation from the channel needs no action
                if self.state == SessionState::Answering
                    && self.state.transition_to(SessionState::Conversing).is_ok()
                {
                    self.decide_cycle(ANSWERED_PROMPT).await;
                }
            }
            CallEvent::GatherResult { input, .. } => {
                if self.state == SessionState::Conversing {
                    let text = if input.trim().is_empty() {
                        "The caller did not say anything.".to_string()
                    } else {
                        input
                    };
                    self.decide_cycle(&text).await;
                } else {
                    tracing::debug!(
                        session_ref = %self.session_ref,
                        state = %self.state,
                        "Gather result outside conversation ignored"
                    );
                }
            }
            CallEvent::DtmfReceived { digit, .. } => {
                if self.state == SessionState::Conversing {
                    self.decide_cycle(&format!("The caller pressed {}.", digit))
                        .await;
                }
            }
            CallEvent::PlaybackFinished { .. } => {
                tracing::debug!(session_ref = %self.session_ref, "Playback finished");
            }
            CallEvent::Hangup { .. } => {
                tracing::info!(session_ref = %self.session_ref, "Remote hangup");
                self.end(false).await;
            }
            CallEvent::Error { message, .. } => {
                tracing::warn!(
                    session_ref = %self.session_ref,
                    %message,
                    "Channel reported an error"
                );
            }
        }
    }

    /// A call must be answered before audio can flow; only then does the
    /// conversation start.
    async fn answer_and_greet(&mut self) {
        if let Err(err) = self.state.transition_to(SessionState::Answering) {
            tracing::error!(session_ref = %self.session_ref, %err, "Cannot answer");
            return;
        }

        let response = self
            .registry
            .dispatch(&VerbRequest::new(
                self.session_ref.clone(),
                VerbParams::Answer,
            ))
            .await;

        if self.call_ended_while_busy() {
            tracing::info!(session_ref = %self.session_ref, "Call ended while answering");
            self.close();
            return;
        }

        match response.error_code() {
            Some(ErrorCode::NotFound) => {
                tracing::warn!(session_ref = %self.session_ref, "Leg gone before answer");
                self.close();
                return;
            }
            Some(code) => {
                // Already-answered or a transport hiccup; the leg is still
                // live, so converse anyway
                tracing::warn!(
                    session_ref = %self.session_ref,
                    code = ?code,
                    "Answer failed, continuing"
                );
            }
            None => {}
        }

        if self.state.transition_to(SessionState::Conversing).is_ok() {
            self.decide_cycle(ANSWERED_PROMPT).await;
        }
    }

    /// One decision cycle: decide with bounded retry, then apply.
    ///
    /// Provider failures leave the conversation unchanged, so retrying with
    /// identical state is safe; once the bounded retries are spent the
    /// session speaks the configured fallback instead of dying.
    async fn decide_cycle(&mut self, event_text: &str) {
        let attempts = 1 + self.settings.max_provider_retries;

        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::warn!(
                    session_ref = %self.session_ref,
                    attempt,
                    max = self.settings.max_provider_retries,
                    "Retrying decide"
                );
            }

            match self.model.decide(event_text).await {
                Ok(decision) => {
                    self.apply_decision(decision).await;
                    return;
                }
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    tracing::warn!(session_ref = %self.session_ref, %err, "Decide failed");
                }
                Err(err) => {
                    tracing::error!(
                        session_ref = %self.session_ref,
                        %err,
                        "Provider unavailable, speaking fallback"
                    );
                    let line = self.settings.fallback_line.clone();
                    if self.speak(&line).await {
                        self.model.record_spoken_line(&line);
                    }
                    return;
                }
            }

            if self.call_ended_while_busy() {
                tracing::info!(session_ref = %self.session_ref, "Call ended during decide");
                self.close();
                return;
            }
        }
    }

    /// Apply a decision: speak first, then dispatch tool invocations
    /// strictly in order. A hangup tool ends the session and drops the
    /// remainder; a dead leg does the same.
    async fn apply_decision(&mut self, decision: Decision) {
        if self.call_ended_while_busy() {
            tracing::info!(
                session_ref = %self.session_ref,
                "Call ended during decide; discarding decision"
            );
            self.close();
            return;
        }

        if let Some(text) = &decision.say {
            if !self.speak(text).await {
                return;
            }
        }

        for call in decision.tool_invocations {
            if self.call_ended_while_busy() {
                tracing::info!(
                    session_ref = %self.session_ref,
                    "Call ended; dropping remaining tool invocations"
                );
                self.close();
                return;
            }
            if self.dispatch_tool(&call).await.is_break() {
                return;
            }
        }
    }

    /// Dispatch one tool invocation through the verb registry.
    /// Break means the session ended (hangup or dead leg).
    async fn dispatch_tool(&mut self, call: &ToolCall) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow;

        let Some(verb) = Verb::from_tool_name(&call.name) else {
            tracing::warn!(
                session_ref = %self.session_ref,
                tool = %call.name,
                "Tool resolves to no verb handler; not dispatched"
            );
            self.model.record_tool_result(
                call,
                error_content(ErrorCode::ValidationError, "tool resolves to no verb handler"),
            );
            return ControlFlow::Continue(());
        };

        let params = match VerbParams::from_tool_arguments(verb, call.arguments_value()) {
            Ok(params) => params,
            Err(message) => {
                self.model
                    .record_tool_result(call, error_content(ErrorCode::ValidationError, &message));
                return ControlFlow::Continue(());
            }
        };

        if self
            .state
            .transition_to(SessionState::ToolDispatch)
            .is_err()
        {
            return ControlFlow::Break(());
        }

        let response = self
            .registry
            .dispatch(&VerbRequest::new(self.session_ref.clone(), params))
            .await;

        let content = match &response.outcome {
            VerbOutcome::Result(value) => serde_json::json!({ "result": value }),
            VerbOutcome::Error(err) => {
                serde_json::json!({ "error": { "code": err.code, "message": err.message } })
            }
        };
        self.model.record_tool_result(call, content);

        let hangup_succeeded = verb == Verb::Hangup && !response.is_error();
        let leg_gone = response.error_code() == Some(ErrorCode::NotFound);

        if self.state.transition_to(SessionState::Conversing).is_err() {
            return ControlFlow::Break(());
        }

        if hangup_succeeded {
            tracing::info!(session_ref = %self.session_ref, "Model hung up the call");
            self.close();
            return ControlFlow::Break(());
        }
        if leg_gone {
            tracing::warn!(session_ref = %self.session_ref, "Leg gone during dispatch");
            self.end(false).await;
            return ControlFlow::Break(());
        }

        ControlFlow::Continue(())
    }

    /// Speak text on the leg; false means the leg is gone and the session
    /// was ended.
    async fn speak(&mut self, text: &str) -> bool {
        let response = self
            .registry
            .dispatch(&VerbRequest::new(
                self.session_ref.clone(),
                VerbParams::Say {
                    text: text.to_string(),
                },
            ))
            .await;

        match response.error_code() {
            Some(ErrorCode::NotFound) => {
                self.end(false).await;
                false
            }
            Some(code) => {
                // Audio failure is survivable; the next cycle may recover
                tracing::warn!(
                    session_ref = %self.session_ref,
                    code = ?code,
                    "Say failed"
                );
                true
            }
            None => true,
        }
    }

    /// Enter `Ending`, optionally issuing a best-effort hangup, then close
    async fn end(&mut self, send_hangup: bool) {
        if self.state.is_closed() {
            return;
        }
        if self.state.transition_to(SessionState::Ending).is_ok() && send_hangup {
            let response = self
                .registry
                .dispatch(&VerbRequest::new(
                    self.session_ref.clone(),
                    VerbParams::Hangup,
                ))
                .await;
            if response.is_error() {
                tracing::debug!(
                    session_ref = %self.session_ref,
                    "Best-effort hangup failed"
                );
            }
        }
        self.close();
    }

    fn close(&mut self) {
        if !self.state.is_closed() {
            // Closed is reachable from every live state
            let _ = self.state.transition_to(SessionState::Closed);
        }
    }
}

const ANSWERED_PROMPT: &str = "The call has been answered. Greet the caller.";

fn error_content(code: ErrorCode, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}
