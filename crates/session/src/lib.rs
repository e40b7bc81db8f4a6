//! Session lifecycle and orchestration
//!
//! A session is the lifetime of one active call leg. Its orchestrator routes
//! control-channel events to the language model, routes the model's
//! decisions to verb handlers, and serializes the interaction so at most one
//! decision cycle is ever in flight per session.

pub mod manager;
pub mod orchestrator;
pub mod state;
pub mod tools;

pub use manager::SessionManager;
pub use orchestrator::SessionOrchestrator;
pub use state::SessionState;
pub use tools::call_control_tools;

use thiserror::Error;

use callflow_core::SessionRef;
use state::SessionState as State;

/// Session-level errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A transition the state machine does not allow
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: State, to: State },

    /// The session is closed or unknown; the event is rejected as terminal
    #[error("session {0} is terminal")]
    Terminal(SessionRef),

    /// A second orchestrator was requested for an active session reference
    #[error("session {0} already has an active orchestrator")]
    Duplicate(SessionRef),

    /// Session capacity exhausted
    #[error("maximum of {0} concurrent sessions reached")]
    Capacity(usize),

    /// The session's event queue is gone or full
    #[error("event delivery failed for session {0}")]
    Delivery(SessionRef),

    /// Model construction failed
    #[error("model setup failed: {0}")]
    ModelSetup(#[from] callflow_llm::LlmError),
}
