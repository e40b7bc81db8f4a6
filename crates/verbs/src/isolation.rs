//! Error isolation for verb handlers
//!
//! A terminated process mid-call drops a live phone call, so no handler
//! failure may escape. `Isolated` wraps a handler into one of identical
//! shape whose every outcome is a well-formed `VerbResponse`: failures are
//! caught, classified into a coarse error code, and delivered on the same
//! path a success would use. The session and its channel stay usable
//! afterwards.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use callflow_core::ChannelError;

use crate::handlers::{HandlerError, VerbHandler};
use crate::protocol::{ErrorCode, VerbRequest, VerbResponse};

/// Wraps a handler so execution is infallible from the caller's view
pub struct Isolated {
    inner: Arc<dyn VerbHandler>,
}

impl Isolated {
    pub fn new(inner: Arc<dyn VerbHandler>) -> Self {
        Self { inner }
    }

    /// Execute the request; always yields exactly one response.
    pub async fn execute(&self, request: &VerbRequest) -> VerbResponse {
        let verb = request.verb();
        let outcome = AssertUnwindSafe(self.inner.handle(request))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let (code, message) = classify(&err);
                tracing::warn!(
                    session_ref = %request.session_ref,
                    verb = %verb,
                    code = ?code,
                    %message,
                    "Verb failed"
                );
                VerbResponse::error(request.session_ref.clone(), verb, code, message)
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!(
                    session_ref = %request.session_ref,
                    verb = %verb,
                    %message,
                    "Verb handler panicked"
                );
                VerbResponse::error(
                    request.session_ref.clone(),
                    verb,
                    ErrorCode::Unknown,
                    message,
                )
            }
        }
    }
}

/// Coarse classification: transport/channel vs validation vs unknown.
///
/// Both `NotFound` and `Terminal` mean the call leg no longer exists and
/// surface as `NOT_FOUND`, the only code the orchestrator treats as fatal.
fn classify(err: &HandlerError) -> (ErrorCode, String) {
    match err {
        HandlerError::Validation(msg) => (ErrorCode::ValidationError, msg.clone()),
        HandlerError::WrongVerb { .. } => (ErrorCode::ValidationError, err.to_string()),
        HandlerError::Channel(ChannelError::NotFound(_))
        | HandlerError::Channel(ChannelError::Terminal(_)) => {
            (ErrorCode::NotFound, err.to_string())
        }
        HandlerError::Channel(_) => (ErrorCode::ChannelError, err.to_string()),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
