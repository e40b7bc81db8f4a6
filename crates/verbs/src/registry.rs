//! Verb registry
//!
//! Maps each verb to its single handler and dispatches requests through the
//! isolation wrapper with a bounded execution timeout. A verb (or tool name)
//! that resolves to no handler produces a validation error without any
//! dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callflow_core::CallChannel;

use crate::handlers::{
    AnswerHandler, DialHandler, GatherHandler, HangupHandler, MuteHandler, PlayHandler,
    SayHandler, SendDtmfHandler, UnmuteHandler, VerbHandler,
};
use crate::isolation::Isolated;
use crate::protocol::{ErrorCode, Verb, VerbRequest, VerbResponse};

/// Registry of verb handlers for one control channel
pub struct VerbRegistry {
    handlers: HashMap<Verb, Arc<dyn VerbHandler>>,
    /// Per-dispatch execution timeout. A timeout is an unknown-outcome
    /// failure; the side effect may have partially applied.
    timeout: Duration,
}

impl VerbRegistry {
    /// Create an empty registry
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Create a registry with every built-in handler wired to `channel`
    pub fn with_channel(channel: Arc<dyn CallChannel>, timeout: Duration) -> Self {
        let mut registry = Self::new(timeout);
        registry.register(AnswerHandler::new(channel.clone()));
        registry.register(SayHandler::new(channel.clone()));
        registry.register(PlayHandler::new(channel.clone()));
        registry.register(GatherHandler::new(channel.clone()));
        registry.register(DialHandler::new(channel.clone()));
        registry.register(HangupHandler::new(channel.clone()));
        registry.register(MuteHandler::new(channel.clone()));
        registry.register(UnmuteHandler::new(channel.clone()));
        registry.register(SendDtmfHandler::new(channel));

        tracing::debug!(verbs = registry.len(), "Built verb registry");
        registry
    }

    /// Register a handler under its verb, replacing any previous one
    pub fn register<H: VerbHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.verb(), Arc::new(handler));
    }

    pub fn get(&self, verb: Verb) -> Option<&Arc<dyn VerbHandler>> {
        self.handlers.get(&verb)
    }

    pub fn has(&self, verb: Verb) -> bool {
        self.handlers.contains_key(&verb)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Execute one request: exactly one response, never a propagated failure.
    ///
    /// The handler runs behind the isolation wrapper and under the
    /// registry's timeout; elapsed time surfaces as a `TIMEOUT` error
    /// response and is never retried here.
    pub async fn dispatch(&self, request: &VerbRequest) -> VerbResponse {
        let verb = request.verb();
        let handler = match self.handlers.get(&verb) {
            Some(handler) => handler.clone(),
            None => {
                return VerbResponse::error(
                    request.session_ref.clone(),
                    verb,
                    ErrorCode::ValidationError,
                    format!("no handler registered for verb {}", verb),
                );
            }
        };

        tracing::debug!(
            session_ref = %request.session_ref,
            verb = %verb,
            "Dispatching verb"
        );

        let isolated = Isolated::new(handler);
        match tokio::time::timeout(self.timeout, isolated.execute(request)).await {
            Ok(response) => response,
            Err(_elapsed) => VerbResponse::error(
                request.session_ref.clone(),
                verb,
                ErrorCode::Timeout,
                format!(
                    "verb {} timed out after {}ms; outcome unknown",
                    verb,
                    self.timeout.as_millis()
                ),
            ),
        }
    }
}
