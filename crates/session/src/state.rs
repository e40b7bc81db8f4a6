//! Session state machine
//!
//! Explicit tagged states with a static guarded transition table, so an
//! illegal transition (dispatching a verb after `Closed`, answering twice)
//! is rejected at the call site instead of surfacing as a runtime bug
//! somewhere downstream.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

use crate::SessionError;

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// First event seen for a new session reference
    #[default]
    Created,
    /// Issuing the answer verb; no conversation yet
    Answering,
    /// Feeding events to the model and speaking its responses
    Conversing,
    /// A tool decision is executing against the channel
    ToolDispatch,
    /// Best-effort hangup on the way out
    Ending,
    /// Conversation state and model binding released
    Closed,
}

static TRANSITIONS: Lazy<HashMap<SessionState, &'static [SessionState]>> = Lazy::new(|| {
    use SessionState::*;
    let mut map = HashMap::new();
    map.insert(Created, &[Answering, Ending, Closed] as &[_]);
    map.insert(Answering, &[Conversing, Ending, Closed] as &[_]);
    map.insert(Conversing, &[ToolDispatch, Ending, Closed] as &[_]);
    map.insert(ToolDispatch, &[Conversing, Ending, Closed] as &[_]);
    map.insert(Ending, &[Closed] as &[_]);
    map.insert(Closed, &[] as &[_]);
    map
});

impl SessionState {
    /// Allowed transitions from this state
    pub fn allowed_transitions(&self) -> &'static [SessionState] {
        TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: SessionState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Move to `target`, rejecting anything the table does not allow
    pub fn transition_to(&mut self, target: SessionState) -> Result<(), SessionError> {
        if !self.can_transition_to(target) {
            return Err(SessionError::IllegalTransition {
                from: *self,
                to: target,
            });
        }
        tracing::debug!(from = %self, to = %target, "Session transition");
        *self = target;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Answering => "answering",
            SessionState::Conversing => "conversing",
            SessionState::ToolDispatch => "tool_dispatch",
            SessionState::Ending => "ending",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = SessionState::Created;
        state.transition_to(SessionState::Answering).unwrap();
        state.transition_to(SessionState::Conversing).unwrap();
        state.transition_to(SessionState::ToolDispatch).unwrap();
        state.transition_to(SessionState::Conversing).unwrap();
        state.transition_to(SessionState::Ending).unwrap();
        state.transition_to(SessionState::Closed).unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn test_closed_is_final() {
        let mut state = SessionState::Closed;
        for target in [
            SessionState::Created,
            SessionState::Answering,
            SessionState::Conversing,
            SessionState::ToolDispatch,
            SessionState::Ending,
        ] {
            assert!(matches!(
                state.transition_to(target),
                Err(SessionError::IllegalTransition { .. })
            ));
        }
    }

    #[test]
    fn test_no_dispatch_before_conversing() {
        assert!(!SessionState::Created.can_transition_to(SessionState::ToolDispatch));
        assert!(!SessionState::Answering.can_transition_to(SessionState::ToolDispatch));
    }

    #[test]
    fn test_every_state_can_reach_closed() {
        for state in [
            SessionState::Created,
            SessionState::Answering,
            SessionState::Conversing,
            SessionState::ToolDispatch,
            SessionState::Ending,
        ] {
            assert!(
                state.can_transition_to(SessionState::Closed)
                    || state.can_transition_to(SessionState::Ending)
            );
        }
    }
}
