//! Session management
//!
//! Maps each session reference to its single live orchestrator and routes
//! control-channel events to it in arrival order. Events for a reference
//! with no live session are rejected as terminal; a second incoming event
//! for a live reference is rejected as a duplicate, so the
//! one-orchestrator-per-leg invariant holds by construction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use callflow_config::Settings;
use callflow_core::{CallChannel, CallEvent, SessionRef, TelephonyContext};
use callflow_llm::{AutopilotModel, LlmError, ModelFactory};
use callflow_verbs::VerbRegistry;

use crate::orchestrator::SessionOrchestrator;
use crate::tools::call_control_tools;
use crate::SessionError;

/// Builds a fresh model for each new session
pub type ModelBuilder =
    Arc<dyn Fn(&TelephonyContext) -> Result<AutopilotModel, LlmError> + Send + Sync>;

/// Routes events to per-session orchestrators
pub struct SessionManager {
    sessions: Arc<DashMap<SessionRef, mpsc::Sender<CallEvent>>>,
    registry: Arc<VerbRegistry>,
    model_builder: ModelBuilder,
    settings: Settings,
}

impl SessionManager {
    /// Create a manager that builds models from configuration, with every
    /// verb handler wired to `channel`.
    pub fn new(channel: Arc<dyn CallChannel>, settings: Settings) -> Self {
        let registry = Arc::new(VerbRegistry::with_channel(
            channel,
            Duration::from_millis(settings.session.verb_timeout_ms),
        ));

        let llm = settings.llm.clone();
        let decide_timeout = Duration::from_millis(settings.session.decide_timeout_ms);
        let model_builder: ModelBuilder = Arc::new(move |context| {
            ModelFactory::create_model(&llm, call_control_tools(), context, decide_timeout)
        });

        Self {
            sessions: Arc::new(DashMap::new()),
            registry,
            model_builder,
            settings,
        }
    }

    /// Replace how models are built (tests, custom tool sets)
    pub fn with_model_builder(mut self, builder: ModelBuilder) -> Self {
        self.model_builder = builder;
        self
    }

    /// Route one control-channel event. Incoming events create a session;
    /// everything else goes to the live orchestrator for its reference.
    pub async fn route_event(&self, event: CallEvent) -> Result<(), SessionError> {
        match &event {
            CallEvent::Incoming {
                session_ref,
                caller,
                callee,
            } => {
                let context = TelephonyContext::new(caller, callee);
                let tx = self.create_session(session_ref.clone(), context)?;
                tx.send(event.clone())
                    .await
                    .map_err(|_| SessionError::Delivery(event.session_ref().clone()))
            }
            _ => {
                let session_ref = event.session_ref().clone();
                let tx = self
                    .sessions
                    .get(&session_ref)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| SessionError::Terminal(session_ref.clone()))?;
                tx.send(event)
                    .await
                    .map_err(|_| SessionError::Delivery(session_ref))
            }
        }
    }

    fn create_session(
        &self,
        session_ref: SessionRef,
        context: TelephonyContext,
    ) -> Result<mpsc::Sender<CallEvent>, SessionError> {
        if self.sessions.contains_key(&session_ref) {
            return Err(SessionError::Duplicate(session_ref));
        }
        if self.sessions.len() >= self.settings.session.max_sessions {
            return Err(SessionError::Capacity(self.settings.session.max_sessions));
        }

        let model = (self.model_builder)(&context)?;
        let (orchestrator, tx) = SessionOrchestrator::new(
            session_ref.clone(),
            model,
            self.registry.clone(),
            self.settings.session.clone(),
        );

        // The entry keeps one-orchestrator-per-ref under concurrent routing
        match self.sessions.entry(session_ref.clone()) {
            Entry::Occupied(_) => return Err(SessionError::Duplicate(session_ref)),
            Entry::Vacant(entry) => {
                entry.insert(tx.clone());
            }
        }

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            orchestrator.run().await;
            sessions.remove(&session_ref);
        });

        Ok(tx)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a session reference currently has a live orchestrator
    pub fn is_active(&self, session_ref: &SessionRef) -> bool {
        self.sessions.contains_key(session_ref)
    }
}
